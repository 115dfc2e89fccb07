use pagepulse_page::{EntrySubscription, PageSession};
use pagepulse_types::{
    entries::{EntryFilter, EntryType, FIRST_CONTENTFUL_PAINT},
    metrics::{MetricKind, MetricResult},
};
use tracing::{debug, info, warn};

use crate::handle::{MetricCallback, MetricHandle, Reporter};

async fn watch_first_contentful_paint(
    session: PageSession,
    mut paint: EntrySubscription,
    reporter: Reporter<MetricResult>,
) {
    let lifecycle = session.lifecycle().clone();
    let hidden = lifecycle.hidden();
    tokio::pin!(hidden);

    loop {
        tokio::select! {
            biased;
            batch = paint.next_batch() => {
                let Some(entries) = batch else { break };
                if let Some(entry) = entries.into_iter().find(|e| e.name == FIRST_CONTENTFUL_PAINT) {
                    paint.disconnect();
                    let metric = MetricResult::rated(
                        MetricKind::Fcp,
                        entry.start_time,
                        session.config().fcp.thresholds,
                    );
                    info!(rating = metric.rating.as_str(), "FCP at {:.1}ms", metric.value);
                    reporter.report(metric);
                    return;
                }
            }
            _ = &mut hidden => {
                debug!("page hidden before first contentful paint");
                break;
            }
        }
    }
    paint.disconnect();
}

/// First Contentful Paint, read straight from the paint timeline.
pub fn on_fcp(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    if !session.timeline().supports_observer() {
        warn!("performance observation unsupported; FCP unavailable");
        return MetricHandle::unsupported();
    }
    let paint = match session
        .timeline()
        .observe(EntryFilter::single(EntryType::Paint), true)
    {
        Ok(paint) => paint,
        Err(err) => {
            warn!("FCP observer could not be registered: {err}");
            return MetricHandle::unsupported();
        }
    };
    let (reporter, handle) = MetricHandle::channel(callback);
    tokio::spawn(watch_first_contentful_paint(session.clone(), paint, reporter));
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, Outcome};
    use pagepulse_types::{
        config::PulseConfig,
        entries::{PerformanceEntry, FIRST_PAINT},
        metrics::Rating,
    };

    #[tokio::test]
    async fn reports_first_contentful_paint_only() {
        let page = testing::simulated_page();
        let handle = on_fcp(&page.session(PulseConfig::default()), None);
        page.record_entries(vec![
            PerformanceEntry::paint(FIRST_PAINT, 120.0),
            PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 2_100.0),
        ])
        .expect("paint");

        let metric = handle.await.reported().expect("fcp reported");
        assert_eq!(metric.name, MetricKind::Fcp);
        assert_eq!(metric.value, 2_100.0);
        assert_eq!(metric.rating, Rating::NeedsImprovement);
    }

    #[tokio::test]
    async fn buffered_paint_is_replayed() {
        let page = testing::simulated_page();
        page.record_entry(PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 640.0))
            .expect("paint");
        let metric = on_fcp(&page.session(PulseConfig::default()), None)
            .await
            .reported()
            .expect("fcp reported");
        assert_eq!(metric.value, 640.0);
        assert_eq!(metric.rating, Rating::Good);
    }

    #[tokio::test]
    async fn hidden_page_without_paint_is_skipped() {
        let page = testing::simulated_page();
        let handle = on_fcp(&page.session(PulseConfig::default()), None);
        page.hide();
        assert_eq!(handle.await, Outcome::Skipped);
    }
}
