use pagepulse_page::{EntrySubscription, PageSession};
use pagepulse_types::{
    entries::{EntryFilter, EntryType, PerformanceEntry},
    metrics::{MetricKind, MetricResult},
    Result,
};
use tracing::{debug, info, warn};

use crate::{
    handle::{MetricCallback, MetricHandle, Reporter},
    is_reportable,
};

fn is_user_input(entries: &[PerformanceEntry]) -> bool {
    entries
        .iter()
        .any(|entry| entry.interaction_id.unwrap_or_default() > 0)
}

async fn track_largest_paint(
    session: PageSession,
    mut candidates: EntrySubscription,
    mut inputs: EntrySubscription,
    reporter: Reporter<MetricResult>,
) {
    let lifecycle = session.lifecycle().clone();
    let hidden = lifecycle.hidden();
    tokio::pin!(hidden);
    let mut latest: Option<f64> = None;

    loop {
        tokio::select! {
            biased;
            batch = candidates.next_batch(), if candidates.is_connected() => {
                if let Some(last) = batch.as_deref().and_then(<[PerformanceEntry]>::last) {
                    latest = Some(last.start_time);
                }
            }
            batch = inputs.next_batch(), if inputs.is_connected() => {
                if batch.as_deref().is_some_and(is_user_input) {
                    debug!("user input finalizes LCP");
                    break;
                }
            }
            _ = &mut hidden => break,
        }
    }
    candidates.disconnect();
    inputs.disconnect();

    match latest.filter(|time| is_reportable(*time)) {
        Some(value) => {
            let metric = MetricResult::rated(MetricKind::Lcp, value, session.config().lcp.thresholds);
            info!(rating = metric.rating.as_str(), "LCP at {value:.1}ms");
            reporter.report(metric);
        }
        None => debug!("no largest-contentful-paint candidate observed"),
    }
}

fn open(session: &PageSession) -> Result<(EntrySubscription, EntrySubscription)> {
    let timeline = session.timeline();
    let candidates = timeline.observe(EntryFilter::single(EntryType::LargestContentfulPaint), true)?;
    let inputs = timeline.observe(EntryFilter::single(EntryType::Event), false)?;
    Ok((candidates, inputs))
}

/// Largest Contentful Paint; the last candidate wins once the user
/// interacts or the page is hidden.
pub fn on_lcp(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    if !session.timeline().supports_observer() {
        warn!("performance observation unsupported; LCP unavailable");
        return MetricHandle::unsupported();
    }
    let (candidates, inputs) = match open(session) {
        Ok(subscriptions) => subscriptions,
        Err(err) => {
            warn!("LCP observers could not be registered: {err}");
            return MetricHandle::unsupported();
        }
    };
    let (reporter, handle) = MetricHandle::channel(callback);
    tokio::spawn(track_largest_paint(session.clone(), candidates, inputs, reporter));
    handle
}
