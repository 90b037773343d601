//! Rendering backend capability
//!
//! The pipeline talks to a browser tab only through [`RenderingEngine`]:
//! five page operations plus `release`. [`ChromeTab`] is the chromiumoxide
//! implementation; tests substitute fakes and mocks.

use crate::{EngineError, OutputFormat};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::page::{Page, ScreenshotParams};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// One isolated browser tab bound to a single target.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RenderingEngine: Send {
    /// Loads `url` and waits for the load event.
    async fn navigate(&mut self, url: &str) -> Result<(), EngineError>;

    /// Resolves once the first element matching `selector` is rendered
    /// with a non-empty box. Never gives up on its own.
    async fn wait_visible(&mut self, selector: &str) -> Result<(), EngineError>;

    async fn capture_outer_html(&mut self, selector: &str) -> Result<String, EngineError>;

    async fn capture_full_page_screenshot(
        &mut self,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, EngineError>;

    /// Runs `script` and returns its array result as strings. Non-string
    /// entries come back as empty strings.
    async fn evaluate(&mut self, script: &str) -> Result<Vec<String>, EngineError>;

    /// Closes the tab. Calling it twice is a no-op.
    async fn release(&mut self) -> Result<(), EngineError>;
}

const VISIBILITY_POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ChromeTab {
    page: Option<Page>,
    poll_interval: Duration,
}

impl ChromeTab {
    pub fn new(page: Page) -> Self {
        Self {
            page: Some(page),
            poll_interval: VISIBILITY_POLL_INTERVAL,
        }
    }

    fn page(&self) -> Result<&Page, EngineError> {
        self.page.as_ref().ok_or(EngineError::Closed)
    }

    async fn evaluate_expression<T: serde::de::DeserializeOwned>(
        &self,
        expression: &str,
    ) -> Result<T, EngineError> {
        let result = self
            .page()?
            .evaluate_expression(EvaluateParams::new(expression))
            .await?;
        Ok(result.into_value()?)
    }
}

fn visibility_probe(selector: &str) -> Result<String, EngineError> {
    let selector = serde_json::to_string(selector)?;
    Ok(format!(
        "(() => {{ const el = document.querySelector({selector}); if (!el) return false; \
         const style = window.getComputedStyle(el); const rect = el.getBoundingClientRect(); \
         return style.display !== 'none' && style.visibility !== 'hidden' \
         && (rect.width > 0 || rect.height > 0); }})()"
    ))
}

fn cdp_format(format: OutputFormat) -> CaptureScreenshotFormat {
    match format {
        OutputFormat::Png => CaptureScreenshotFormat::Png,
        OutputFormat::Jpeg => CaptureScreenshotFormat::Jpeg,
        OutputFormat::Webp => CaptureScreenshotFormat::Webp,
    }
}

#[async_trait]
impl RenderingEngine for ChromeTab {
    async fn navigate(&mut self, url: &str) -> Result<(), EngineError> {
        self.page()?.goto(url).await?;
        Ok(())
    }

    async fn wait_visible(&mut self, selector: &str) -> Result<(), EngineError> {
        let probe = visibility_probe(selector)?;
        loop {
            if self.evaluate_expression::<bool>(&probe).await? {
                return Ok(());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn capture_outer_html(&mut self, selector: &str) -> Result<String, EngineError> {
        let element = self
            .page()?
            .find_element(selector)
            .await
            .map_err(|e| EngineError::ElementNotFound(format!("{selector}: {e}")))?;

        Ok(element.outer_html().await?.unwrap_or_default())
    }

    async fn capture_full_page_screenshot(
        &mut self,
        format: OutputFormat,
        quality: u8,
    ) -> Result<Vec<u8>, EngineError> {
        let mut params = ScreenshotParams::builder()
            .format(cdp_format(format))
            .full_page(true);

        if format.is_lossy() {
            params = params.quality(i64::from(quality));
        }

        Ok(self.page()?.screenshot(params.build()).await?)
    }

    async fn evaluate(&mut self, script: &str) -> Result<Vec<String>, EngineError> {
        let values: Vec<Value> = self.evaluate_expression(script).await?;
        Ok(values
            .into_iter()
            .map(|value| match value {
                Value::String(s) => s,
                _ => String::new(),
            })
            .collect())
    }

    async fn release(&mut self) -> Result<(), EngineError> {
        if let Some(page) = self.page.take() {
            page.close().await?;
        }
        Ok(())
    }
}

impl Drop for ChromeTab {
    fn drop(&mut self) {
        // Reached when a unit is cancelled or panics before `release`.
        let Some(page) = self.page.take() else {
            return;
        };

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("Failed to close abandoned tab: {}", e);
                }
            });
        }
    }
}
