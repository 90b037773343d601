//! # sitegrab
//!
//! Concurrent page capture through a headless Chrome. For every target URL
//! the tool saves three artifacts: the rendered HTML document, a full-page
//! screenshot and the list of hyperlinks found on the page.
//!
//! Each target runs as its own task with its own browser tab and its own
//! deadline (45 seconds per target, 30 seconds for the single-target
//! command). A target that fails, stalls or panics never affects the others,
//! and a run only finishes once every target has succeeded or failed.
//!
//! ## Output layout
//!
//! Artifacts are named after the target's host key: the host, plus the port
//! when it is not the scheme default, with `:` replaced by `_`.
//!
//! | Artifact | Path |
//! |----------|------|
//! | HTML | `html/{host}_site_data.html` |
//! | Screenshot | `screenshots/{host}_screenshot.png` |
//! | Links | `url/{host}_urls.txt` |
//!
//! Whatever was captured before a failing step is still written; empty
//! artifacts never are.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sitegrab::{shutdown_channel, BrowserAllocator, Config, Orchestrator};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let allocator = Arc::new(BrowserAllocator::launch(&config.browser, &config.viewport).await?);
//!     let (_trigger, shutdown) = shutdown_channel();
//!
//!     let orchestrator = Orchestrator::new(allocator.clone(), config, shutdown);
//!     orchestrator.scrape_all("https://example.com,https://example.org").await;
//!
//!     drop(orchestrator);
//!     allocator.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! sitegrab scrape --url https://example.com,https://example.org
//! sitegrab --brave single --url https://example.com
//! sitegrab validate --config sitegrab.json
//! ```

/// Configuration and settings for the scraper
pub mod config;

/// Error types shared by every stage
pub mod error;

/// Target parsing and host key derivation
pub mod host;

/// Rendering backend capability and its Chrome implementation
pub mod engine;

/// Browser process and tab allocation
pub mod allocator;

/// Deadline-bounded sessions and the shutdown scope
pub mod session;

/// The fixed extraction sequence
pub mod pipeline;

/// Artifact persistence
pub mod writer;

/// Concurrent fan-out over targets
pub mod orchestrator;

/// Command-line interface implementation
pub mod cli;

/// Run metrics
pub mod metrics;

#[cfg(test)]
mod fakes;

#[cfg(test)]
mod tests;

pub use self::metrics::MetricsExporter;
pub use allocator::*;
pub use cli::*;
pub use config::*;
pub use engine::*;
pub use error::*;
pub use host::*;
pub use orchestrator::*;
pub use pipeline::*;
pub use session::*;
pub use writer::*;
