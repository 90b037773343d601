use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::ArtifactKind;

/// Failures a single target can run into, from URL validation through
/// artifact persistence. Every variant stays inside the unit that produced it.
#[derive(Debug, Clone, Error)]
pub enum ScrapeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Navigation failed: {0}")]
    NavigationFailure(String),

    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    #[error("Capture failed: {0}")]
    CaptureFailure(String),

    #[error("Failed to write {kind} artifact to {}: {reason}", path.display())]
    PersistenceFailure {
        kind: ArtifactKind,
        path: PathBuf,
        reason: String,
    },

    #[error("Browser tab unavailable: {0}")]
    BrowserUnavailable(String),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Cancelled by shutdown")]
    Cancelled,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl ScrapeError {
    /// Stable label used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            ScrapeError::InvalidUrl(_) => "invalid_url",
            ScrapeError::NavigationFailure(_) => "navigation_failure",
            ScrapeError::DeadlineExceeded(_) => "deadline_exceeded",
            ScrapeError::CaptureFailure(_) => "capture_failure",
            ScrapeError::PersistenceFailure { .. } => "persistence_failure",
            ScrapeError::BrowserUnavailable(_) => "browser_unavailable",
            ScrapeError::BrowserLaunchFailed(_) => "browser_launch_failed",
            ScrapeError::Cancelled => "cancelled",
            ScrapeError::ConfigurationError(_) => "configuration_error",
        }
    }

    pub fn is_deadline(&self) -> bool {
        matches!(self, ScrapeError::DeadlineExceeded(_))
    }
}

/// Errors reported by a rendering backend. The pipeline decides which
/// [`ScrapeError`] they become based on the step that was running.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("element not found: {0}")]
    ElementNotFound(String),

    #[error("unexpected script result: {0}")]
    Decode(String),

    #[error("tab already closed")]
    Closed,
}

impl From<chromiumoxide::error::CdpError> for EngineError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        EngineError::Protocol(err.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Decode(err.to_string())
    }
}
