//! Process-wide browser allocator
//!
//! One Chrome process is launched per run. Sessions never touch it directly:
//! they ask a [`TabAllocator`] for a fresh tab and own that tab exclusively
//! until they release it.

use crate::{create_browser_config, BrowserSettings, ChromeTab, EngineError, RenderingEngine, ScrapeError, Viewport};
use async_trait::async_trait;
use chromiumoxide::browser::Browser;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Hands out isolated rendering contexts.
///
/// Implementations are shared read-only between every concurrent unit.
#[async_trait]
pub trait TabAllocator: Send + Sync {
    async fn open_tab(&self) -> Result<Box<dyn RenderingEngine>, EngineError>;
}

/// Chrome process plus the task driving its DevTools connection
pub struct BrowserAllocator {
    browser: Browser,
    handler: JoinHandle<()>,
}

impl BrowserAllocator {
    /// Launches the browser described by `settings`.
    pub async fn launch(settings: &BrowserSettings, viewport: &Viewport) -> Result<Self, ScrapeError> {
        let browser_config = create_browser_config(settings, viewport)?;

        match &settings.executable {
            Some(path) => info!("Launching browser at {}", path.display()),
            None => info!("Launching auto-detected browser"),
        }

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScrapeError::BrowserLaunchFailed(e.to_string()))?;

        // The handler stream must be polled for any page command to complete.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
            info!("Browser handler stream ended");
        });

        Ok(Self {
            browser,
            handler: handler_task,
        })
    }

    pub fn is_alive(&self) -> bool {
        !self.handler.is_finished()
    }

    /// Closes the browser once every unit has dropped its reference.
    pub async fn shutdown(self: Arc<Self>) {
        info!("Shutting down browser...");

        match Arc::try_unwrap(self) {
            Ok(mut allocator) => {
                if let Err(e) = allocator.browser.close().await {
                    warn!("Browser did not close cleanly: {}", e);
                }
                if let Err(e) = allocator.browser.wait().await {
                    warn!("Failed to reap browser process: {}", e);
                }
                allocator.handler.abort();
                info!("Browser shutdown complete");
            }
            Err(shared) => {
                warn!(
                    "Browser still referenced by {} holders, leaving it to be dropped",
                    Arc::strong_count(&shared) - 1
                );
            }
        }
    }
}

#[async_trait]
impl TabAllocator for BrowserAllocator {
    async fn open_tab(&self) -> Result<Box<dyn RenderingEngine>, EngineError> {
        if !self.is_alive() {
            return Err(EngineError::Protocol("browser connection has stopped".to_string()));
        }

        let page = self.browser.new_page("about:blank").await?;
        Ok(Box::new(ChromeTab::new(page)))
    }
}
