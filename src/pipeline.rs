use crate::{PipelineSettings, ScrapeError, Session};
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::{debug, warn};

/// Position of a target in the fixed extraction sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Navigating,
    WaitingVisible,
    CapturingHtml,
    CapturingScreenshot,
    ExtractingLinks,
    Done,
    Failed,
}

impl PipelineState {
    /// The state entered after this one succeeds. Terminal states stay put.
    pub fn next(self) -> Self {
        match self {
            PipelineState::Navigating => PipelineState::WaitingVisible,
            PipelineState::WaitingVisible => PipelineState::CapturingHtml,
            PipelineState::CapturingHtml => PipelineState::CapturingScreenshot,
            PipelineState::CapturingScreenshot => PipelineState::ExtractingLinks,
            PipelineState::ExtractingLinks => PipelineState::Done,
            PipelineState::Done => PipelineState::Done,
            PipelineState::Failed => PipelineState::Failed,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineState::Navigating => "navigating",
            PipelineState::WaitingVisible => "waiting_visible",
            PipelineState::CapturingHtml => "capturing_html",
            PipelineState::CapturingScreenshot => "capturing_screenshot",
            PipelineState::ExtractingLinks => "extracting_links",
            PipelineState::Done => "done",
            PipelineState::Failed => "failed",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one pipeline run captured.
///
/// Fields hold whatever was captured before a failure; `failure` and
/// `failed_at` say what stopped the run. Links are raw, in document order,
/// empty entries included.
#[derive(Debug, Clone)]
pub struct ScrapeResult {
    pub target: String,
    pub html: Option<String>,
    pub screenshot: Vec<u8>,
    pub links: Vec<String>,
    pub state: PipelineState,
    pub failed_at: Option<PipelineState>,
    pub failure: Option<ScrapeError>,
    pub finished_at: DateTime<Utc>,
}

impl ScrapeResult {
    fn started(target: &str) -> Self {
        Self {
            target: target.to_string(),
            html: None,
            screenshot: Vec::new(),
            links: Vec::new(),
            state: PipelineState::Navigating,
            failed_at: None,
            failure: None,
            finished_at: Utc::now(),
        }
    }

    /// A result for a target that never reached the pipeline.
    pub fn failed_before_start(target: &str, error: ScrapeError) -> Self {
        Self {
            state: PipelineState::Failed,
            failed_at: Some(PipelineState::Navigating),
            failure: Some(error),
            ..Self::started(target)
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == PipelineState::Done && self.failure.is_none()
    }
}

/// Runs navigate → wait → HTML → screenshot → links against a session.
#[derive(Debug, Clone)]
pub struct ExtractionPipeline {
    settings: PipelineSettings,
}

impl ExtractionPipeline {
    pub fn new(settings: PipelineSettings) -> Self {
        Self { settings }
    }

    /// Drives the session through every step. The first failing step moves
    /// the run to `Failed` and nothing after it is attempted.
    pub async fn run(&self, session: &mut Session) -> ScrapeResult {
        let mut result = ScrapeResult::started(session.target().as_str());

        while !result.state.is_terminal() {
            let step = result.state;
            debug!("Pipeline step {} for {}", step, result.target);

            match self.execute(step, session, &mut result).await {
                Ok(()) => result.state = step.next(),
                Err(e) => {
                    warn!("Step {} failed for {}: {}", step, result.target, e);
                    result.failed_at = Some(step);
                    result.failure = Some(e);
                    result.state = PipelineState::Failed;
                }
            }
        }

        result.finished_at = Utc::now();
        result
    }

    async fn execute(
        &self,
        step: PipelineState,
        session: &mut Session,
        result: &mut ScrapeResult,
    ) -> Result<(), ScrapeError> {
        match step {
            PipelineState::Navigating => session.navigate().await,
            PipelineState::WaitingVisible => {
                session.wait_visible(&self.settings.readiness_selector).await
            }
            PipelineState::CapturingHtml => {
                result.html = Some(session.capture_html(&self.settings.html_selector).await?);
                Ok(())
            }
            PipelineState::CapturingScreenshot => {
                result.screenshot = session
                    .capture_screenshot(
                        self.settings.screenshot_format,
                        self.settings.screenshot_quality,
                    )
                    .await?;
                Ok(())
            }
            PipelineState::ExtractingLinks => {
                result.links = session.extract_links(&self.settings.link_script).await?;
                Ok(())
            }
            PipelineState::Done | PipelineState::Failed => Ok(()),
        }
    }
}
