use crate::{
    filter_links, ArtifactLayout, BrowserAllocator, BrowserSelection, Config, Orchestrator,
    ShutdownSignal,
};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sitegrab")]
#[command(about = "Capture HTML, screenshots and links from web pages")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, help = "Custom browser executable path")]
    pub exec_path: Option<PathBuf>,

    #[arg(long, conflicts_with = "exec_path", help = "Use Brave from its default install location")]
    pub brave: bool,

    #[arg(long, help = "Directory that receives the artifacts")]
    pub output_dir: Option<PathBuf>,

    #[arg(long, help = "Per-target deadline in seconds")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Write Prometheus metrics to this file after the run")]
    pub metrics_out: Option<PathBuf>,
}

impl Cli {
    pub fn browser_selection(&self) -> BrowserSelection {
        match (&self.exec_path, self.brave) {
            (Some(path), _) => BrowserSelection::Path(path.clone()),
            (None, true) => BrowserSelection::Brave,
            (None, false) => BrowserSelection::Default,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scrape every URL in a delimited list concurrently
    Scrape {
        #[arg(short, long, help = "Target URLs, e.g. https://a.test,https://b.test")]
        url: String,

        #[arg(long, help = "Maximum targets in flight at once (default: unbounded)")]
        max_concurrent: Option<usize>,

        #[arg(long, help = "Separator between URLs (default: ,)")]
        delimiter: Option<char>,
    },

    /// Scrape one URL into fixed file names and print its links
    Single {
        #[arg(short, long, help = "URL to scrape")]
        url: String,
    },

    /// Validate configuration
    Validate {
        #[arg(short, long, help = "Configuration file to validate")]
        config: PathBuf,
    },
}

pub struct CliRunner {
    pub config: Config,
    pub allocator: Arc<BrowserAllocator>,
    shutdown: ShutdownSignal,
}

impl CliRunner {
    /// Launches the browser every command run shares.
    pub async fn new(config: Config, shutdown: ShutdownSignal) -> anyhow::Result<Self> {
        let allocator = BrowserAllocator::launch(&config.browser, &config.viewport)
            .await
            .context("could not start the browser")?;

        Ok(Self {
            config,
            allocator: Arc::new(allocator),
            shutdown,
        })
    }

    pub async fn run(&self, command: Commands) -> anyhow::Result<()> {
        match command {
            Commands::Scrape {
                url,
                max_concurrent,
                delimiter,
            } => self.run_scrape(&url, max_concurrent, delimiter).await,
            Commands::Single { url } => self.run_single(&url).await,
            Commands::Validate { config } => validate_config(&config).await,
        }
    }

    /// Per-target failures are logged by their units and never fail the run.
    pub async fn run_scrape(
        &self,
        urls: &str,
        max_concurrent: Option<usize>,
        delimiter: Option<char>,
    ) -> anyhow::Result<()> {
        let mut config = self.config.clone();
        if max_concurrent.is_some() {
            config.max_concurrent_targets = max_concurrent;
        }
        if let Some(delimiter) = delimiter {
            config.target_delimiter = delimiter;
        }
        config.validate()?;

        let orchestrator = Orchestrator::new(self.allocator.clone(), config, self.shutdown.clone());
        orchestrator.scrape_all(urls).await;
        Ok(())
    }

    pub async fn run_single(&self, url: &str) -> anyhow::Result<()> {
        let orchestrator =
            Orchestrator::new(self.allocator.clone(), self.config.clone(), self.shutdown.clone());
        let layout = ArtifactLayout::Flat(self.config.output.root.clone());
        let report = orchestrator.scrape_single(url, layout).await;

        if let Some(failure) = &report.result.failure {
            bail!("scrape of {} failed: {}", url.trim(), failure);
        }

        let links = filter_links(&report.result.links);
        println!("Scraped URL: {}", url.trim());
        for path in report.writes.written() {
            println!("  Saved: {}", path.display());
        }
        if links.is_empty() {
            println!("No URLs found.");
        } else {
            println!("Extracted URLs ({}):", links.len());
            for link in links {
                println!("{link}");
            }
        }

        let failures = report.writes.failures();
        if !failures.is_empty() {
            for failure in &failures {
                error!("{}", failure);
            }
            bail!("{} artifact(s) could not be written", failures.len());
        }

        Ok(())
    }

    /// Closes the browser. Call after every orchestrator is gone.
    pub async fn shutdown(self) {
        self.allocator.shutdown().await;
    }
}

pub async fn validate_config(config_path: &Path) -> anyhow::Result<()> {
    println!("Validating configuration: {}", config_path.display());

    let config = read_config_file(config_path).await?;
    config.validate()?;

    println!("Configuration is valid:");
    println!("  Target timeout: {:?}", config.target_timeout);
    println!("  Single-target timeout: {:?}", config.single_target_timeout);
    match config.max_concurrent_targets {
        Some(cap) => println!("  Max concurrent targets: {cap}"),
        None => println!("  Max concurrent targets: unbounded"),
    }
    println!("  Target delimiter: {:?}", config.target_delimiter);
    println!("  Readiness selector: {}", config.pipeline.readiness_selector);
    println!(
        "  Screenshot: {:?} (quality {})",
        config.pipeline.screenshot_format, config.pipeline.screenshot_quality
    );
    println!("  Persist partial results: {}", config.persist_partial_results);
    println!("  Output root: {}", config.output.root.display());
    println!(
        "  Viewport: {}x{}",
        config.viewport.width, config.viewport.height
    );

    Ok(())
}

async fn read_config_file(path: &Path) -> anyhow::Result<Config> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid config in {}", path.display()))
}

/// Loads the config file if given, then applies command-line overrides.
pub async fn load_config(args: &Cli) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => read_config_file(path).await?,
        None => Config::default(),
    };

    if let Some(executable) = args.browser_selection().resolve()? {
        match (&args.exec_path, args.brave) {
            (None, true) => info!("Using Brave browser at: {}", executable.display()),
            _ => info!("Using custom browser path: {}", executable.display()),
        }
        config.browser.executable = Some(executable);
    }

    if let Some(root) = &args.output_dir {
        config.output.root = root.clone();
    }

    if let Some(timeout) = args.timeout {
        config.target_timeout = Duration::from_secs(timeout);
        config.single_target_timeout = Duration::from_secs(timeout);
    }

    config.validate()?;

    info!("Configuration loaded successfully");
    info!("Target timeout: {:?}", config.target_timeout);
    info!("Output root: {}", config.output.root.display());

    Ok(config)
}

pub fn setup_logging(verbose: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install logger: {e}"))?;

    Ok(())
}
