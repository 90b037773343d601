//! Configuration management with serde serialization/deserialization
//!
//! This module holds every setting the scraper reads: per-target deadlines,
//! the extraction pipeline's selectors and script, the output layout and the
//! browser launch options.

use crate::ScrapeError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Desktop Chrome user agent sent by every tab.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Script run by the link extraction step.
pub const DEFAULT_LINK_SCRIPT: &str = "Array.from(document.querySelectorAll('a')).map(a => a.href)";

/// Main configuration structure for the scraper
///
/// Loaded from an optional JSON file, then overridden by command-line flags.
/// Missing fields fall back to [`Config::default`].
///
/// # Examples
///
/// ```rust
/// use sitegrab::Config;
/// use std::time::Duration;
///
/// let config = Config {
///     max_concurrent_targets: Some(8),
///     target_timeout: Duration::from_secs(60),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Deadline for one target in a multi-target run (default: 45 seconds)
    ///
    /// Covers navigation and every capture step. Expiry fails only that
    /// target.
    pub target_timeout: Duration,

    /// Deadline for the single-target command (default: 30 seconds)
    pub single_target_timeout: Duration,

    /// Optional cap on concurrently running targets (default: none)
    ///
    /// `None` launches every target at once. A cap only delays units; it never
    /// drops or short-circuits them.
    pub max_concurrent_targets: Option<usize>,

    /// Separator between targets in the `--url` list (default: `,`)
    pub target_delimiter: char,

    /// Settings for the fixed extraction sequence
    pub pipeline: PipelineSettings,

    /// Write artifacts captured before a failing step (default: true)
    ///
    /// When false, a failed target writes nothing at all.
    pub persist_partial_results: bool,

    /// Where artifacts land on disk
    pub output: OutputLayout,

    /// Browser viewport configuration
    pub viewport: Viewport,

    /// Browser executable and launch options
    pub browser: BrowserSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            target_timeout: Duration::from_secs(45),
            single_target_timeout: Duration::from_secs(30),
            max_concurrent_targets: None,
            target_delimiter: ',',
            pipeline: PipelineSettings::default(),
            persist_partial_results: true,
            output: OutputLayout::default(),
            viewport: Viewport::default(),
            browser: BrowserSettings::default(),
        }
    }
}

impl Config {
    /// Rejects settings that would make every target fail or hang.
    pub fn validate(&self) -> Result<(), ScrapeError> {
        if self.target_timeout.is_zero() || self.single_target_timeout.is_zero() {
            return Err(ScrapeError::ConfigurationError(
                "timeouts must be greater than 0".to_string(),
            ));
        }

        if self.max_concurrent_targets == Some(0) {
            return Err(ScrapeError::ConfigurationError(
                "max concurrent targets must be greater than 0".to_string(),
            ));
        }

        if self.target_delimiter.is_whitespace() {
            return Err(ScrapeError::ConfigurationError(
                "target delimiter cannot be whitespace".to_string(),
            ));
        }

        if self.pipeline.screenshot_quality > 100 {
            return Err(ScrapeError::ConfigurationError(format!(
                "screenshot quality {} is outside 0..=100",
                self.pipeline.screenshot_quality
            )));
        }

        if self.pipeline.readiness_selector.trim().is_empty()
            || self.pipeline.html_selector.trim().is_empty()
        {
            return Err(ScrapeError::ConfigurationError(
                "pipeline selectors cannot be empty".to_string(),
            ));
        }

        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(ScrapeError::ConfigurationError(
                "viewport dimensions must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Settings for the navigate → wait → HTML → screenshot → links sequence
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Element that must be visible before capturing (default: `body`)
    pub readiness_selector: String,

    /// Element whose outer HTML is captured (default: `html`)
    pub html_selector: String,

    /// Screenshot encoding (default: PNG)
    pub screenshot_format: OutputFormat,

    /// Encoder quality for lossy formats (default: 90)
    ///
    /// PNG output is lossless and ignores it.
    pub screenshot_quality: u8,

    /// Script returning the page's hyperlink targets in document order
    pub link_script: String,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            readiness_selector: "body".to_string(),
            html_selector: "html".to_string(),
            screenshot_format: OutputFormat::Png,
            screenshot_quality: 90,
            link_script: DEFAULT_LINK_SCRIPT.to_string(),
        }
    }
}

/// Output directory layout
///
/// Multi-target runs namespace artifacts per host under three directories;
/// the single-target command writes fixed names directly under `root`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputLayout {
    /// Base directory for everything (default: current directory)
    pub root: PathBuf,
    /// HTML artifacts, relative to `root` (default: `html`)
    pub html_dir: PathBuf,
    /// Screenshot artifacts, relative to `root` (default: `screenshots`)
    pub screenshot_dir: PathBuf,
    /// Link list artifacts, relative to `root` (default: `url`)
    pub url_dir: PathBuf,
}

impl Default for OutputLayout {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            html_dir: PathBuf::from("html"),
            screenshot_dir: PathBuf::from("screenshots"),
            url_dir: PathBuf::from("url"),
        }
    }
}

impl OutputLayout {
    pub fn rooted_at(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Default::default()
        }
    }
}

/// Browser viewport configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in pixels (default: 1920)
    pub width: u32,

    /// Viewport height in pixels (default: 1080)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Screenshot encodings supported by the capture step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum OutputFormat {
    /// PNG format - lossless compression
    Png,
    /// JPEG format - lossy compression, honours quality
    Jpeg,
    /// WebP format - lossy compression, honours quality
    Webp,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Webp => "webp",
        }
    }

    pub fn is_lossy(&self) -> bool {
        !matches!(self, OutputFormat::Png)
    }
}

/// Browser launch options shared read-only by every session
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Path to the browser executable (default: auto-detect)
    pub executable: Option<PathBuf>,

    /// Run without a visible window (default: true)
    pub headless: bool,

    /// User-Agent header for every tab
    pub user_agent: String,

    /// Extra command-line switches appended after the defaults
    pub extra_args: Vec<String>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            executable: None,
            headless: true,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            extra_args: Vec::new(),
        }
    }
}

/// Which browser binary to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrowserSelection {
    /// Let chromiumoxide find a Chrome/Chromium install
    Default,
    /// An explicit executable path
    Path(PathBuf),
    /// Brave at one of its well-known install locations
    Brave,
}

const BRAVE_CANDIDATES: &[&str] = &[
    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
    r"C:\Program Files (x86)\BraveSoftware\Brave-Browser\Application\brave.exe",
    "/usr/bin/brave-browser",
    "/usr/bin/brave",
    "/snap/bin/brave",
    "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
];

impl BrowserSelection {
    /// Resolves the selection to an executable path, `None` meaning
    /// auto-detection.
    pub fn resolve(&self) -> Result<Option<PathBuf>, ScrapeError> {
        self.resolve_with(|path| path.exists())
    }

    fn resolve_with(&self, exists: impl Fn(&Path) -> bool) -> Result<Option<PathBuf>, ScrapeError> {
        match self {
            BrowserSelection::Default => Ok(None),
            BrowserSelection::Path(path) => Ok(Some(path.clone())),
            BrowserSelection::Brave => BRAVE_CANDIDATES
                .iter()
                .map(PathBuf::from)
                .find(|candidate| exists(candidate))
                .map(Some)
                .ok_or_else(|| {
                    ScrapeError::ConfigurationError(format!(
                        "Brave not found, looked in: {}",
                        BRAVE_CANDIDATES.join(", ")
                    ))
                }),
        }
    }
}

/// Generate Chrome command-line switches from the browser settings
///
/// Headless mode and sandboxing are handled by the `BrowserConfig` builder;
/// these are the remaining switches.
pub fn get_chrome_args(settings: &BrowserSettings) -> Vec<String> {
    let mut args = vec![
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-extensions".to_string(),
        "--disable-default-apps".to_string(),
        "--disable-sync".to_string(),
        "--no-first-run".to_string(),
        "--hide-scrollbars".to_string(),
        "--mute-audio".to_string(),
        format!("--user-agent={}", settings.user_agent),
    ];

    args.extend(settings.extra_args.iter().cloned());
    args
}

pub fn create_browser_config(
    settings: &BrowserSettings,
    viewport: &Viewport,
) -> Result<chromiumoxide::browser::BrowserConfig, ScrapeError> {
    use chromiumoxide::browser::BrowserConfig;

    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(viewport.width, viewport.height)
        .args(get_chrome_args(settings));

    if !settings.headless {
        builder = builder.with_head();
    }

    if let Some(executable) = &settings.executable {
        builder = builder.chrome_executable(executable);
    }

    builder.build().map_err(ScrapeError::BrowserLaunchFailed)
}
