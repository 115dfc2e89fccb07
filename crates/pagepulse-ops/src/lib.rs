//! Operational helpers: logging, metric storage, summary persistence.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::Utc;
use pagepulse_types::{
    config::OpsConfig,
    events::MetricEvent,
    metrics::{MetricResult, MetricsSummary},
    PulseError, Result,
};
use tokio::sync::Mutex;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ops_error(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|err| ops_error(format!("tracing init error: {err}")))?;
    Ok(())
}

/// In-memory record of everything a monitor published.
#[derive(Clone, Default)]
pub struct MetricStore {
    events: Arc<Mutex<Vec<MetricEvent>>>,
    metrics: Arc<Mutex<Vec<MetricResult>>>,
    summaries: Arc<Mutex<Vec<MetricsSummary>>>,
}

impl MetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_event(&self, event: MetricEvent) -> Result<()> {
        self.events.lock().await.push(event);
        Ok(())
    }

    pub async fn record_metric(&self, metric: MetricResult) -> Result<()> {
        self.metrics.lock().await.push(metric);
        Ok(())
    }

    pub async fn record_summary(&self, summary: MetricsSummary) -> Result<()> {
        self.summaries.lock().await.push(summary);
        Ok(())
    }

    pub async fn snapshot_events(&self) -> Vec<MetricEvent> {
        self.events.lock().await.clone()
    }

    pub async fn snapshot_metrics(&self) -> Vec<MetricResult> {
        self.metrics.lock().await.clone()
    }

    pub async fn latest_summary(&self) -> Option<MetricsSummary> {
        self.summaries.lock().await.last().cloned()
    }
}

pub fn ensure_report_dir(path: &str) -> Result<PathBuf> {
    let dir = PathBuf::from(path);
    fs::create_dir_all(&dir)
        .map_err(|err| ops_error(format!("failed to create report dir: {err}")))?;
    info!("Report directory ready at {:?}", dir);
    Ok(dir)
}

/// Writes `summary` as pretty JSON into `dir`; returns the file path.
pub fn persist_summary(dir: &Path, summary: &MetricsSummary) -> Result<PathBuf> {
    let file = dir.join(format!("summary-{}.json", Utc::now().format("%Y%m%dT%H%M%S%.3f")));
    let body = serde_json::to_string_pretty(summary)
        .map_err(|err| ops_error(format!("failed to encode summary: {err}")))?;
    fs::write(&file, body)
        .map_err(|err| ops_error(format!("failed to write {}: {err}", file.display())))?;
    info!("Summary written to {}", file.display());
    Ok(file)
}

pub fn ops_error(message: impl Into<String>) -> PulseError {
    PulseError::Ops(message.into())
}
