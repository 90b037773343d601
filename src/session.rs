//! Deadline-bounded rendering sessions
//!
//! A [`Session`] binds one target to one tab, a fixed deadline and a child of
//! the process-wide shutdown scope. Every backend call goes through
//! [`Session::bounded`], so deadline expiry and shutdown surface as ordinary
//! step failures. Expiry in one session has no effect on any other.

use crate::{EngineError, OutputFormat, RenderingEngine, ScrapeError, TabAllocator, Target};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Fires the process-wide cancellation scope.
#[derive(Debug)]
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

/// Receiving side of the process-wide cancellation scope. Each session holds
/// its own clone.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_fired(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the scope is fired. Pends forever if the trigger is
    /// dropped without firing.
    pub async fn fired(&mut self) {
        if self.rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

pub struct Session {
    target: Target,
    engine: Box<dyn RenderingEngine>,
    shutdown: ShutdownSignal,
    budget: Duration,
    deadline: Instant,
}

impl Session {
    /// Opens a tab for `target`. The deadline starts now, so a slow tab
    /// allocation eats into the target's budget.
    pub async fn open(
        target: Target,
        allocator: &dyn TabAllocator,
        mut shutdown: ShutdownSignal,
        budget: Duration,
    ) -> Result<Self, ScrapeError> {
        let deadline = Instant::now() + budget;

        if shutdown.is_fired() {
            return Err(ScrapeError::Cancelled);
        }

        let engine = tokio::select! {
            opened = tokio::time::timeout_at(deadline, allocator.open_tab()) => match opened {
                Ok(Ok(engine)) => engine,
                Ok(Err(e)) => return Err(ScrapeError::BrowserUnavailable(e.to_string())),
                Err(_) => return Err(ScrapeError::DeadlineExceeded(budget)),
            },
            _ = shutdown.fired() => return Err(ScrapeError::Cancelled),
        };

        debug!("Opened session for {} with {:?} budget", target, budget);

        Ok(Self {
            target,
            engine,
            shutdown,
            budget,
            deadline,
        })
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Races a backend call against the deadline and the shutdown scope.
    /// `on_error` maps a backend failure to the step's error kind.
    async fn bounded<T>(
        deadline: Instant,
        budget: Duration,
        shutdown: &mut ShutdownSignal,
        op: impl Future<Output = Result<T, EngineError>>,
        on_error: fn(String) -> ScrapeError,
    ) -> Result<T, ScrapeError> {
        tokio::select! {
            outcome = tokio::time::timeout_at(deadline, op) => match outcome {
                Ok(result) => result.map_err(|e| on_error(e.to_string())),
                Err(_) => Err(ScrapeError::DeadlineExceeded(budget)),
            },
            _ = shutdown.fired() => Err(ScrapeError::Cancelled),
        }
    }

    pub async fn navigate(&mut self) -> Result<(), ScrapeError> {
        let url = self.target.url().as_str().to_string();
        Self::bounded(
            self.deadline,
            self.budget,
            &mut self.shutdown,
            self.engine.navigate(&url),
            ScrapeError::NavigationFailure,
        )
        .await
    }

    pub async fn wait_visible(&mut self, selector: &str) -> Result<(), ScrapeError> {
        Self::bounded(
            self.deadline,
            self.budget,
            &mut self.shutdown,
            self.engine.wait_visible(selector),
            ScrapeError::NavigationFailure,
        )
        .await
    }

    pub async fn capture_html(&mut self, selector: &str) -> Result<String, ScrapeError> {
        Self::bounded(
            self.deadline,
            self.budget,
            &mut self.shutdown,
            self.engine.capture_outer_html(selector),
            ScrapeError::CaptureFailure,
        )
        .await
    }

    pub async fn capture_screenshot(
        &mut self,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, ScrapeError> {
        Self::bounded(
            self.deadline,
            self.budget,
            &mut self.shutdown,
            self.engine.capture_full_page_screenshot(format, quality),
            ScrapeError::CaptureFailure,
        )
        .await
    }

    pub async fn extract_links(&mut self, script: &str) -> Result<Vec<String>, ScrapeError> {
        Self::bounded(
            self.deadline,
            self.budget,
            &mut self.shutdown,
            self.engine.evaluate(script),
            ScrapeError::CaptureFailure,
        )
        .await
    }

    /// Releases the tab. Runs regardless of how the pipeline ended; if it is
    /// never reached, the engine's own drop releases the tab instead.
    pub async fn close(mut self) -> Target {
        if let Err(e) = self.engine.release().await {
            warn!("Failed to release tab for {}: {}", self.target, e);
        }
        self.target
    }
}
