//! Run metrics recorded through the `metrics` facade
//!
//! Nothing is collected unless a recorder is installed. The CLI installs a
//! Prometheus recorder when `--metrics-out` is given and dumps the rendered
//! text once every unit has finished.

use crate::{ArtifactKind, ScrapeError, ScrapeResult};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub const UNITS_LAUNCHED: &str = "sitegrab_units_launched_total";
pub const UNIT_OUTCOMES: &str = "sitegrab_unit_outcomes_total";
pub const UNIT_DURATION: &str = "sitegrab_unit_duration_seconds";
pub const ARTIFACT_WRITES: &str = "sitegrab_artifact_writes_total";

pub fn record_unit_launched() {
    counter!(UNITS_LAUNCHED).increment(1);
}

/// Counts one finished unit under `success` or its error kind.
pub fn record_unit_outcome(result: &ScrapeResult, elapsed: Duration) {
    let outcome = result
        .failure
        .as_ref()
        .map(ScrapeError::kind)
        .unwrap_or("success");

    counter!(UNIT_OUTCOMES, "outcome" => outcome).increment(1);
    histogram!(UNIT_DURATION).record(elapsed.as_secs_f64());
}

pub fn record_artifact(kind: ArtifactKind, status: &'static str) {
    counter!(ARTIFACT_WRITES, "kind" => kind.as_str(), "status" => status).increment(1);
}

/// Global Prometheus recorder whose contents are written to a file.
pub struct MetricsExporter {
    handle: PrometheusHandle,
}

impl MetricsExporter {
    pub fn install() -> Result<Self, ScrapeError> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| ScrapeError::ConfigurationError(format!("metrics recorder: {e}")))?;

        Ok(Self { handle })
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, self.render()).await?;
        info!("Metrics written to {}", path.display());
        Ok(())
    }
}
