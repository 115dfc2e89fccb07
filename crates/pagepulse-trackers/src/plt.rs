use pagepulse_page::PageSession;
use pagepulse_types::metrics::{MetricKind, MetricResult};
use tracing::{info, warn};

use crate::{
    handle::{MetricCallback, MetricHandle, Reporter},
    is_reportable, settle_after_load,
};

async fn measure_page_load(session: PageSession, reporter: Reporter<MetricResult>) {
    let config = &session.config().plt;
    settle_after_load(session.lifecycle().clone(), config.settle_delay()).await;

    let load = session
        .navigation_timing()
        .and_then(|timing| timing.load_offset())
        .filter(|value| is_reportable(*value));
    let Some(value) = load else {
        warn!("PLT skipped: loadEventEnd was never recorded");
        return;
    };
    let metric = MetricResult::rated(MetricKind::Plt, value, config.thresholds);
    info!(rating = metric.rating.as_str(), "PLT {value:.1}ms");
    reporter.report(metric);
}

/// Page Load Time: navigation start to the end of the `load` event.
pub fn on_plt(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    if session.navigation_timing().is_none() {
        warn!("navigation timing unsupported; PLT unavailable");
        return MetricHandle::unsupported();
    }
    let (reporter, handle) = MetricHandle::channel(callback);
    tokio::spawn(measure_page_load(session.clone(), reporter));
    handle
}
