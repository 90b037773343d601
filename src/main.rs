use clap::Parser;
use sitegrab::{
    load_config, setup_logging, shutdown_channel, validate_config, Cli, CliRunner, Commands,
    MetricsExporter, ShutdownTrigger,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Cli::parse();

    // Setup logging
    setup_logging(args.verbose)?;

    info!("Starting sitegrab v{}", env!("CARGO_PKG_VERSION"));

    if let Commands::Validate { config } = &args.command {
        return validate_config(config).await;
    }

    // The recorder must be in place before any unit records
    let exporter = match &args.metrics_out {
        Some(_) => Some(MetricsExporter::install()?),
        None => None,
    };

    let config = load_config(&args).await?;

    // Setup graceful shutdown
    let (trigger, shutdown) = shutdown_channel();
    let _shutdown_handler = setup_shutdown_handler(trigger);

    let runner = CliRunner::new(config, shutdown).await?;
    let result = runner.run(args.command).await;

    info!("Shutting down...");
    runner.shutdown().await;

    if let (Some(exporter), Some(path)) = (&exporter, &args.metrics_out) {
        if let Err(e) = exporter.write_to(path).await {
            warn!("Failed to write metrics to {}: {}", path.display(), e);
        }
    }

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }

    info!("sitegrab stopped");
    Ok(())
}

/// Fires the shutdown scope on SIGINT or SIGTERM. Units still running fail
/// with `Cancelled` and the run winds down normally.
fn setup_shutdown_handler(trigger: ShutdownTrigger) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        wait_for_signal().await;
        trigger.fire();
    })
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to create SIGINT handler: {}", e);
            return std::future::pending().await;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to create SIGTERM handler: {}", e);
            return std::future::pending().await;
        }
    };

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
