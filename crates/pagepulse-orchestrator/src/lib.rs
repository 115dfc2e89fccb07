//! Outer bootstrap: starts every tracker for one page session and reports
//! the results.

use std::path::PathBuf;

use async_trait::async_trait;
use pagepulse_ops::{ensure_report_dir, MetricStore};
use pagepulse_page::{PageLifecycle, PageSession};
use pagepulse_report::ReportSink;
use pagepulse_trackers::{
    on_fcp, on_fmp, on_fst, on_inp, on_lcp, on_plt, on_resource, MetricHandle, Outcome,
    TtiTracker,
};
use pagepulse_types::{
    events::{LifecyclePhase, MetricEvent},
    metrics::{MetricKind, MetricResult, MetricsSummary},
    PulseError, Result,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct PerformanceMonitor<N>
where
    N: ReportSink + Clone + 'static,
{
    session: PageSession,
    sink: N,
    store: MetricStore,
    detached: Vec<JoinHandle<()>>,
    lifecycle_relay: Option<JoinHandle<()>>,
}

impl<N> PerformanceMonitor<N>
where
    N: ReportSink + Clone + 'static,
{
    pub fn new(session: PageSession, sink: N, store: MetricStore) -> Self {
        Self {
            session,
            sink,
            store,
            detached: Vec::new(),
            lifecycle_relay: None,
        }
    }

    pub fn store(&self) -> &MetricStore {
        &self.store
    }

    /// Prepares the report directory and starts the sink.
    pub async fn boot(&mut self) -> Result<PathBuf> {
        let dir = ensure_report_dir(&self.session.config().ops.report_dir)?;
        self.sink.run().await?;
        Ok(dir)
    }

    /// Waits for LCP, INP and FST. They finish once the page is hidden.
    pub async fn wait_detached(&mut self) {
        for task in self.detached.drain(..) {
            if let Err(err) = task.await {
                warn!("detached tracker task failed: {err}");
            }
        }
    }

    async fn collect(&mut self) -> Result<MetricsSummary> {
        self.publish(MetricEvent::lifecycle(LifecyclePhase::MonitorStart, None))
            .await?;
        self.lifecycle_relay = Some(tokio::spawn(relay_lifecycle(
            self.session.lifecycle().clone(),
            self.sink.clone(),
            self.store.clone(),
        )));

        if !self.session.timeline().supports_observer() {
            warn!("performance observation unsupported; falling back to navigation timing");
            return self.collect_fallback().await;
        }

        self.start_detached();

        let (tti_control, tti) = TtiTracker::spawn(&self.session, None);
        let fcp_anchor = tti_control.clone();
        let fcp = on_fcp(
            &self.session,
            Some(Box::new(move |metric: MetricResult| fcp_anchor.set_fcp_time(metric.value))),
        );
        let fmp = on_fmp(
            &self.session,
            Some(Box::new(move |metric: MetricResult| tti_control.set_fmp_time(metric.value))),
        );
        let plt = on_plt(&self.session, None);
        let resources = on_resource(&self.session, None);

        let (fcp, fmp, tti, plt, resources) = tokio::join!(fcp, fmp, tti, plt, resources);

        let core = [
            (MetricKind::Fcp, fcp),
            (MetricKind::Fmp, fmp),
            (MetricKind::Tti, tti),
            (MetricKind::Plt, plt),
        ];
        let mut missing: Vec<MetricKind> = core
            .iter()
            .filter(|(_, outcome)| outcome.as_reported().is_none())
            .map(|(kind, _)| *kind)
            .collect();
        if resources.as_reported().is_none() {
            missing.push(MetricKind::ResourceLoadTime);
        }
        if !missing.is_empty() {
            warn!(?missing, "core metrics incomplete; nothing published");
            return Err(PulseError::Incomplete { missing });
        }

        let mut summary = MetricsSummary::default();
        for (_, outcome) in core {
            if let Some(metric) = outcome.reported() {
                summary.record(&metric);
                self.publish_metric(metric).await?;
            }
        }
        if let Some(resources) = resources.reported() {
            summary.resources = resources.clone();
            self.publish(MetricEvent::resources(resources)).await?;
        }
        Ok(summary)
    }

    async fn collect_fallback(&mut self) -> Result<MetricsSummary> {
        if self.session.navigation_timing().is_none() {
            return Err(orchestrator_error(
                "neither performance observation nor navigation timing is available",
            ));
        }
        self.session.lifecycle().loaded().await;
        let timing = self.session.navigation_timing().unwrap_or_default();

        let config = self.session.config();
        let candidates = [
            (
                MetricKind::Fcp,
                timing.dom_content_loaded_offset(),
                config.fcp.thresholds,
            ),
            (
                MetricKind::Fmp,
                timing.dom_interactive_offset(),
                config.fmp.thresholds,
            ),
        ];
        let metrics: Vec<MetricResult> = candidates
            .into_iter()
            .filter_map(|(kind, value, thresholds)| {
                value
                    .filter(|value| *value != 0.0)
                    .map(|value| MetricResult::rated(kind, value, thresholds))
            })
            .collect();

        let mut summary = MetricsSummary {
            fallback: true,
            ..MetricsSummary::default()
        };
        for metric in metrics {
            info!("fallback {} at {:.1}ms", metric.name, metric.value);
            summary.record(&metric);
            self.publish_metric(metric).await?;
        }
        Ok(summary)
    }

    fn start_detached(&mut self) {
        let trackers: [(MetricKind, MetricHandle); 3] = [
            (MetricKind::Lcp, on_lcp(&self.session, None)),
            (MetricKind::Inp, on_inp(&self.session, None)),
            (MetricKind::Fst, on_fst(&self.session, None)),
        ];
        for (kind, handle) in trackers {
            self.detached.push(tokio::spawn(publish_when_ready(
                kind,
                handle,
                self.sink.clone(),
                self.store.clone(),
            )));
        }
    }

    async fn publish_metric(&self, metric: MetricResult) -> Result<()> {
        self.store.record_metric(metric.clone()).await?;
        self.publish(MetricEvent::metric(metric)).await
    }

    async fn publish(&self, event: MetricEvent) -> Result<()> {
        publish_to(&self.sink, &self.store, event).await
    }
}

impl<N> Drop for PerformanceMonitor<N>
where
    N: ReportSink + Clone + 'static,
{
    fn drop(&mut self) {
        if let Some(relay) = self.lifecycle_relay.take() {
            relay.abort();
        }
    }
}

async fn publish_to<N: ReportSink>(sink: &N, store: &MetricStore, event: MetricEvent) -> Result<()> {
    let cloned = event.clone();
    sink.publish(event).await?;
    store.record_event(cloned).await?;
    Ok(())
}

async fn publish_when_ready<N: ReportSink>(
    kind: MetricKind,
    handle: MetricHandle,
    sink: N,
    store: MetricStore,
) {
    match handle.await {
        Outcome::Reported(metric) => {
            let recorded = store.record_metric(metric.clone()).await;
            let published = publish_to(&sink, &store, MetricEvent::metric(metric)).await;
            if let Err(err) = recorded.and(published) {
                warn!("failed to publish {kind}: {err}");
            }
        }
        Outcome::Unsupported => debug!("{kind} unsupported on this host"),
        Outcome::Skipped => debug!("{kind} skipped"),
    }
}

async fn relay_lifecycle<N: ReportSink>(lifecycle: PageLifecycle, sink: N, store: MetricStore) {
    lifecycle.dom_content_loaded().await;
    let _ = publish_to(&sink, &store, MetricEvent::lifecycle(LifecyclePhase::DomContentLoaded, None)).await;
    lifecycle.loaded().await;
    let _ = publish_to(&sink, &store, MetricEvent::lifecycle(LifecyclePhase::Load, None)).await;
    lifecycle.hidden().await;
    let _ = publish_to(&sink, &store, MetricEvent::lifecycle(LifecyclePhase::Hidden, None)).await;
}

#[async_trait]
pub trait MonitorRunner {
    async fn run(&mut self) -> Result<MetricsSummary>;
}

#[async_trait]
impl<N> MonitorRunner for PerformanceMonitor<N>
where
    N: ReportSink + Clone + 'static,
{
    /// Collects the core metrics all-or-nothing and publishes the summary.
    async fn run(&mut self) -> Result<MetricsSummary> {
        let result = self.collect().await;
        let details = match &result {
            Ok(summary) => {
                self.store.record_summary(summary.clone()).await?;
                self.publish(MetricEvent::summary(summary.clone())).await?;
                format!("{} metrics collected", summary.values.len())
            }
            Err(err) => err.to_string(),
        };
        self.publish(MetricEvent::lifecycle(LifecyclePhase::MonitorEnd, Some(details)))
            .await?;
        result
    }
}

pub fn orchestrator_error(message: impl Into<String>) -> PulseError {
    PulseError::Capability(message.into())
}
