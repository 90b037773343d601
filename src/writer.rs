//! Artifact persistence
//!
//! A [`ScrapeResult`] becomes up to three files: the HTML document, the
//! screenshot and the link list. Each artifact is written on its own and
//! reported on its own; one failing write never stops the others. Empty
//! artifacts are never written.

use crate::metrics::record_artifact;
use crate::{HostKey, OutputFormat, OutputLayout, ScrapeError, ScrapeResult};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};

pub const LINK_SEPARATOR: &str = "--- Extracted URLs ---";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Html,
    Screenshot,
    Links,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Html => "html",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Links => "links",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where artifacts go.
#[derive(Debug, Clone)]
pub enum ArtifactLayout {
    /// One file per kind per host, under the layout's three directories.
    PerHost(OutputLayout),
    /// Fixed names directly under a directory. Links are not written; the
    /// caller prints them.
    Flat(PathBuf),
}

impl ArtifactLayout {
    pub fn path_for(&self, kind: ArtifactKind, host: &HostKey, format: OutputFormat) -> Option<PathBuf> {
        match self {
            ArtifactLayout::PerHost(layout) => Some(match kind {
                ArtifactKind::Html => layout
                    .root
                    .join(&layout.html_dir)
                    .join(format!("{host}_site_data.html")),
                ArtifactKind::Screenshot => layout
                    .root
                    .join(&layout.screenshot_dir)
                    .join(format!("{host}_screenshot.{}", format.extension())),
                ArtifactKind::Links => layout.root.join(&layout.url_dir).join(format!("{host}_urls.txt")),
            }),
            ArtifactLayout::Flat(root) => match kind {
                ArtifactKind::Html => Some(root.join("site_data.html")),
                ArtifactKind::Screenshot => Some(root.join(format!("screenshot.{}", format.extension()))),
                ArtifactKind::Links => None,
            },
        }
    }

    /// Directories that must exist before any unit writes.
    pub fn directories(&self) -> Vec<PathBuf> {
        match self {
            ArtifactLayout::PerHost(layout) => vec![
                layout.root.join(&layout.html_dir),
                layout.root.join(&layout.screenshot_dir),
                layout.root.join(&layout.url_dir),
            ],
            ArtifactLayout::Flat(root) => vec![root.clone()],
        }
    }
}

#[derive(Debug, Clone)]
pub enum ArtifactOutcome {
    Written { path: PathBuf, bytes: usize },
    Skipped(&'static str),
    Failed(ScrapeError),
}

#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub outcome: ArtifactOutcome,
}

/// Per-artifact outcome of one `persist` call.
#[derive(Debug, Clone, Default)]
pub struct WriteReport {
    pub artifacts: Vec<ArtifactRecord>,
}

impl WriteReport {
    fn push(&mut self, kind: ArtifactKind, outcome: ArtifactOutcome) {
        let status = match &outcome {
            ArtifactOutcome::Written { .. } => "written",
            ArtifactOutcome::Skipped(_) => "skipped",
            ArtifactOutcome::Failed(_) => "failed",
        };
        record_artifact(kind, status);
        self.artifacts.push(ArtifactRecord { kind, outcome });
    }

    pub fn outcome(&self, kind: ArtifactKind) -> Option<&ArtifactOutcome> {
        self.artifacts
            .iter()
            .find(|record| record.kind == kind)
            .map(|record| &record.outcome)
    }

    pub fn written(&self) -> Vec<&PathBuf> {
        self.artifacts
            .iter()
            .filter_map(|record| match &record.outcome {
                ArtifactOutcome::Written { path, .. } => Some(path),
                _ => None,
            })
            .collect()
    }

    pub fn failures(&self) -> Vec<&ScrapeError> {
        self.artifacts
            .iter()
            .filter_map(|record| match &record.outcome {
                ArtifactOutcome::Failed(e) => Some(e),
                _ => None,
            })
            .collect()
    }
}

/// Drops empty link entries, keeping order and duplicates.
pub fn filter_links(links: &[String]) -> Vec<&str> {
    links
        .iter()
        .map(String::as_str)
        .filter(|link| !link.is_empty())
        .collect()
}

/// Renders the link list file: target and capture time, the separator, then
/// one link per line.
pub fn format_link_artifact(target: &str, links: &[&str], captured_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "Scraped URL: {}\nTimestamp: {}\n{}\n",
        target,
        captured_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        LINK_SEPARATOR
    );
    for link in links {
        out.push_str(link);
        out.push('\n');
    }
    out
}

pub struct ResultWriter {
    layout: ArtifactLayout,
    format: OutputFormat,
    persist_partial: bool,
}

impl ResultWriter {
    pub fn new(layout: ArtifactLayout, format: OutputFormat, persist_partial: bool) -> Self {
        Self {
            layout,
            format,
            persist_partial,
        }
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    /// Creates every output directory.
    pub async fn prepare(&self) -> Result<(), ScrapeError> {
        for dir in self.layout.directories() {
            tokio::fs::create_dir_all(&dir).await.map_err(|e| {
                ScrapeError::ConfigurationError(format!(
                    "cannot create output directory {}: {e}",
                    dir.display()
                ))
            })?;
        }
        Ok(())
    }

    pub async fn persist(&self, host: &HostKey, target: &str, result: &ScrapeResult) -> WriteReport {
        let mut report = WriteReport::default();

        if let Some(failure) = &result.failure {
            if !self.persist_partial {
                warn!("[{}] Not saving artifacts for {}: {}", host, target, failure);
                for kind in [ArtifactKind::Html, ArtifactKind::Screenshot, ArtifactKind::Links] {
                    report.push(kind, ArtifactOutcome::Skipped("pipeline failed"));
                }
                return report;
            }
        }

        let html = result.html.as_deref().unwrap_or_default();
        let outcome = if html.is_empty() {
            ArtifactOutcome::Skipped("no html captured")
        } else {
            self.write(ArtifactKind::Html, host, html.as_bytes()).await
        };
        report.push(ArtifactKind::Html, outcome);

        let outcome = if result.screenshot.is_empty() {
            ArtifactOutcome::Skipped("no screenshot captured")
        } else {
            self.write(ArtifactKind::Screenshot, host, &result.screenshot).await
        };
        report.push(ArtifactKind::Screenshot, outcome);

        let links = filter_links(&result.links);
        let outcome = if links.is_empty() {
            if result.failure.is_none() {
                info!("[{}] No URLs found.", host);
            }
            ArtifactOutcome::Skipped("no links")
        } else if self.layout.path_for(ArtifactKind::Links, host, self.format).is_none() {
            ArtifactOutcome::Skipped("links printed")
        } else {
            let body = format_link_artifact(target, &links, result.finished_at);
            let outcome = self.write(ArtifactKind::Links, host, body.as_bytes()).await;
            if let ArtifactOutcome::Written { path, .. } = &outcome {
                info!("[{}] URLs saved to '{}' ({} urls)", host, path.display(), links.len());
            }
            outcome
        };
        report.push(ArtifactKind::Links, outcome);

        report
    }

    async fn write(&self, kind: ArtifactKind, host: &HostKey, bytes: &[u8]) -> ArtifactOutcome {
        let Some(path) = self.layout.path_for(kind, host, self.format) else {
            return ArtifactOutcome::Skipped("no location for artifact");
        };

        match tokio::fs::write(&path, bytes).await {
            Ok(()) => {
                if kind != ArtifactKind::Links {
                    info!("[{}] {} saved to '{}' ({} bytes)", host, kind, path.display(), bytes.len());
                }
                ArtifactOutcome::Written {
                    path,
                    bytes: bytes.len(),
                }
            }
            Err(e) => {
                let failure = ScrapeError::PersistenceFailure {
                    kind,
                    path,
                    reason: e.to_string(),
                };
                error!("[{}] {}", host, failure);
                ArtifactOutcome::Failed(failure)
            }
        }
    }
}
