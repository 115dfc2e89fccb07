use pagepulse_page::PageSession;
use pagepulse_types::{
    entries::{EntryType, PerformanceEntry},
    metrics::{MetricKind, MetricResult, ResourceMetric, ResourceType, Thresholds},
};
use tracing::{info, warn};

use crate::{
    handle::{MetricCallback, MetricHandle, Reporter},
    settle_after_load,
};

/// Rates each resource entry by its fetch duration, slowest first.
pub fn collect_resources(entries: &[PerformanceEntry], thresholds: Thresholds) -> Vec<ResourceMetric> {
    let mut resources: Vec<ResourceMetric> = entries
        .iter()
        .filter(|entry| entry.entry_type == EntryType::Resource)
        .map(|entry| {
            let load_time = entry.response_end_or_duration() - entry.start_time;
            let mut metric = MetricResult::rated(MetricKind::ResourceLoadTime, load_time, thresholds);
            metric.id = entry.name.clone();
            ResourceMetric {
                metric,
                resource_type: ResourceType::classify(&entry.name, entry.initiator_type.as_deref()),
            }
        })
        .collect();
    resources.sort_by(|a, b| b.metric.value.total_cmp(&a.metric.value));
    resources
}

async fn report_resources(session: PageSession, reporter: Reporter<Vec<ResourceMetric>>) {
    let config = &session.config().resource;
    settle_after_load(session.lifecycle().clone(), config.settle_delay()).await;

    let entries = session.timeline().entries_by_type(EntryType::Resource);
    let resources = collect_resources(&entries, config.thresholds);
    info!(count = resources.len(), "resource timings collected");
    reporter.report(resources);
}

/// Per-resource load times, gathered once the page has settled after `load`.
pub fn on_resource(
    session: &PageSession,
    callback: Option<MetricCallback<Vec<ResourceMetric>>>,
) -> MetricHandle<Vec<ResourceMetric>> {
    if session.navigation_timing().is_none() {
        warn!("performance timing unsupported; resource timings unavailable");
        return MetricHandle::unsupported();
    }
    let (reporter, handle) = MetricHandle::channel(callback);
    tokio::spawn(report_resources(session.clone(), reporter));
    handle
}
