//! Fan-out of targets into independent units
//!
//! Each target becomes one spawned task running
//! validate → open session → pipeline → close → persist. Units share only
//! the allocator, the writer and the shutdown signal, all read-only. The
//! orchestrator waits for every unit and never stops early.

use crate::metrics::{record_unit_launched, record_unit_outcome};
use crate::{
    split_targets, ArtifactLayout, Config, ExtractionPipeline, HostKey, ResultWriter, ScrapeError,
    ScrapeResult, Session, ShutdownSignal, TabAllocator, Target, WriteReport,
};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Terminal outcome of one unit.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub result: ScrapeResult,
    pub writes: WriteReport,
}

/// Groups valid targets by host key and returns every key shared by more
/// than one target, with the targets in input order.
pub fn find_host_collisions(targets: &[Target]) -> BTreeMap<HostKey, Vec<String>> {
    let mut by_host: BTreeMap<HostKey, Vec<String>> = BTreeMap::new();
    for target in targets {
        by_host
            .entry(target.host_key().clone())
            .or_default()
            .push(target.as_str().to_string());
    }
    by_host.retain(|_, targets| targets.len() > 1);
    by_host
}

/// Everything a unit needs, shared between all of them.
struct UnitContext {
    allocator: Arc<dyn TabAllocator>,
    pipeline: ExtractionPipeline,
    writer: ResultWriter,
    shutdown: ShutdownSignal,
    timeout: Duration,
}

impl UnitContext {
    async fn run(&self, raw: &str) -> UnitReport {
        let started = Instant::now();
        let outcome = self.scrape(raw).await;
        let elapsed = started.elapsed();

        let report = match outcome {
            Ok((host_key, result)) => {
                let writes = self.writer.persist(&host_key, raw, &result).await;
                UnitReport { result, writes }
            }
            Err(e) => UnitReport {
                result: ScrapeResult::failed_before_start(raw, e),
                writes: WriteReport::default(),
            },
        };

        match &report.result.failure {
            None => info!("Scrape completed in {:?}", elapsed),
            Some(e) => error!(kind = e.kind(), "Failed to scrape: {}", e),
        }
        record_unit_outcome(&report.result, elapsed);
        report
    }

    /// Errors here are failures before any tab exists.
    async fn scrape(&self, raw: &str) -> Result<(HostKey, ScrapeResult), ScrapeError> {
        let target = Target::parse(raw)?;
        let host_key = target.host_key().clone();
        info!("[{}] Navigating...", host_key);

        let mut session = Session::open(
            target,
            self.allocator.as_ref(),
            self.shutdown.clone(),
            self.timeout,
        )
        .await?;
        let result = self.pipeline.run(&mut session).await;
        session.close().await;

        Ok((host_key, result))
    }
}

pub struct Orchestrator {
    allocator: Arc<dyn TabAllocator>,
    config: Config,
    shutdown: ShutdownSignal,
}

impl Orchestrator {
    pub fn new(allocator: Arc<dyn TabAllocator>, config: Config, shutdown: ShutdownSignal) -> Self {
        Self {
            allocator,
            config,
            shutdown,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn per_host_writer(&self) -> ResultWriter {
        ResultWriter::new(
            ArtifactLayout::PerHost(self.config.output.clone()),
            self.config.pipeline.screenshot_format,
            self.config.persist_partial_results,
        )
    }

    /// Splits `input` on the configured delimiter and scrapes every entry.
    pub async fn scrape_all(&self, input: &str) {
        let targets = split_targets(input, self.config.target_delimiter);
        if targets.is_empty() {
            warn!("No targets given");
            return;
        }
        self.scrape_targets(targets).await;
    }

    /// Runs one unit per entry and returns once all of them are terminal.
    pub async fn scrape_targets(&self, targets: Vec<String>) {
        info!("Starting scrape for {} targets: {:?}", targets.len(), targets);

        let valid: Vec<Target> = targets.iter().filter_map(|raw| Target::parse(raw).ok()).collect();
        for (host, colliding) in find_host_collisions(&valid) {
            warn!(
                "Targets {:?} share host key {}; their artifacts will overwrite each other",
                colliding, host
            );
        }

        let context = Arc::new(UnitContext {
            allocator: self.allocator.clone(),
            pipeline: ExtractionPipeline::new(self.config.pipeline.clone()),
            writer: self.per_host_writer(),
            shutdown: self.shutdown.clone(),
            timeout: self.config.target_timeout,
        });
        if let Err(e) = context.writer.prepare().await {
            error!("{}", e);
        }
        let limiter = self.config.max_concurrent_targets.map(|cap| Arc::new(Semaphore::new(cap)));

        let handles: Vec<_> = targets
            .into_iter()
            .map(|raw| {
                let context = context.clone();
                let limiter = limiter.clone();
                let span = info_span!("target", target = %raw, unit = %Uuid::new_v4());
                record_unit_launched();

                tokio::spawn(
                    async move {
                        let _permit = match limiter {
                            Some(limiter) => limiter.acquire_owned().await.ok(),
                            None => None,
                        };
                        context.run(&raw).await
                    }
                    .instrument(span),
                )
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(e) = joined {
                error!("Scrape unit aborted: {}", e);
            }
        }

        info!("All scrapes completed.");
    }

    /// Scrapes exactly one target with the single-target deadline into
    /// `layout`, returning the outcome to the caller.
    pub async fn scrape_single(&self, raw: &str, layout: ArtifactLayout) -> UnitReport {
        let context = UnitContext {
            allocator: self.allocator.clone(),
            pipeline: ExtractionPipeline::new(self.config.pipeline.clone()),
            writer: ResultWriter::new(
                layout,
                self.config.pipeline.screenshot_format,
                self.config.persist_partial_results,
            ),
            shutdown: self.shutdown.clone(),
            timeout: self.config.single_target_timeout,
        };

        if let Err(e) = context.writer.prepare().await {
            error!("{}", e);
        }
        record_unit_launched();
        let span = info_span!("target", target = %raw.trim(), unit = %Uuid::new_v4());
        context.run(raw.trim()).instrument(span).await
    }
}
