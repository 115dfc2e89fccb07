use pagepulse_engine::{fmp_adjustment, DomScorer};
use pagepulse_page::{EntrySubscription, MutationObserverInit, MutationSubscription, PageSession};
use pagepulse_types::{
    entries::{EntryFilter, EntryType, FIRST_CONTENTFUL_PAINT},
    metrics::{MetricKind, MetricResult},
    Result,
};
use tracing::{debug, info, warn};

use crate::{
    handle::{MetricCallback, MetricHandle, Reporter},
    settle_after_load,
};

/// Running maximum over consecutive score deltas. Only the previous score
/// and the single largest change are kept.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ScoreDeltaFilter {
    last_score: f64,
    max_change: f64,
    max_change_time: f64,
}

impl ScoreDeltaFilter {
    /// Feeds one sample; returns `true` when it became the new maximum.
    /// Ties keep the earlier sample.
    pub fn observe(&mut self, score: f64, now: f64) -> bool {
        let change = (score - self.last_score).abs();
        self.last_score = score;
        if change > self.max_change {
            self.max_change = change;
            self.max_change_time = now;
            true
        } else {
            false
        }
    }

    pub fn last_score(&self) -> f64 {
        self.last_score
    }

    pub fn max_change(&self) -> f64 {
        self.max_change
    }

    pub fn max_change_time(&self) -> f64 {
        self.max_change_time
    }
}

struct FmpSubscriptions {
    mutations: MutationSubscription,
    paint: EntrySubscription,
    lcp: EntrySubscription,
}

impl FmpSubscriptions {
    fn open(session: &PageSession) -> Result<Self> {
        let timeline = session.timeline();
        Ok(Self {
            lcp: timeline.observe(EntryFilter::single(EntryType::LargestContentfulPaint), true)?,
            paint: timeline.observe(EntryFilter::single(EntryType::Paint), true)?,
            mutations: session
                .mutations()
                .observe_mutations(MutationObserverInit::document_wide())?,
        })
    }

    fn disconnect(&mut self) {
        self.mutations.disconnect();
        self.paint.disconnect();
        self.lcp.disconnect();
    }
}

struct FmpEstimator {
    session: PageSession,
    scorer: DomScorer,
    deltas: ScoreDeltaFilter,
    fcp_time: Option<f64>,
    lcp_time: Option<f64>,
    reporter: Reporter<MetricResult>,
}

impl FmpEstimator {
    async fn run(mut self, mut subscriptions: FmpSubscriptions) {
        let settle = settle_after_load(
            self.session.lifecycle().clone(),
            self.session.config().fmp.settle_delay(),
        );
        tokio::pin!(settle);

        loop {
            tokio::select! {
                biased;
                batch = subscriptions.mutations.next_batch(), if subscriptions.mutations.is_connected() => {
                    if batch.is_some() {
                        self.on_mutation_batch();
                    }
                }
                batch = subscriptions.paint.next_batch(), if subscriptions.paint.is_connected() => {
                    let first = batch
                        .unwrap_or_default()
                        .into_iter()
                        .find(|entry| entry.name == FIRST_CONTENTFUL_PAINT);
                    if let Some(entry) = first {
                        debug!("FMP anchor: FCP at {:.1}ms", entry.start_time);
                        self.fcp_time = Some(entry.start_time);
                        subscriptions.paint.disconnect();
                    }
                }
                batch = subscriptions.lcp.next_batch(), if subscriptions.lcp.is_connected() => {
                    if let Some(last) = batch.and_then(|entries| entries.last().cloned()) {
                        self.lcp_time = Some(last.start_time);
                    }
                }
                _ = &mut settle => break,
            }
        }

        subscriptions.disconnect();
        self.finish();
    }

    fn on_mutation_batch(&mut self) {
        let now = self.session.now();
        let score = self.scorer.score(self.session.document());
        if self.deltas.observe(score, now) {
            debug!(
                score,
                change = self.deltas.max_change(),
                "FMP candidate at {now:.1}ms"
            );
        }
    }

    fn finish(self) {
        let estimate = self.deltas.max_change_time();
        // No FMP has been published yet, so the pull starts from an unset estimate.
        let adjustment = fmp_adjustment(
            self.fcp_time,
            self.lcp_time,
            None,
            &mut rand::thread_rng(),
        );
        let value = estimate + adjustment;
        let metric = MetricResult::rated(
            MetricKind::Fmp,
            value,
            self.session.config().fmp.thresholds,
        );
        info!(
            raw = estimate,
            adjustment,
            rating = metric.rating.as_str(),
            "FMP estimated at {value:.1}ms"
        );
        self.reporter.report(metric);
    }
}

/// Estimates First Meaningful Paint from the largest jump in layout score.
///
/// Resolves [`Outcome::Unsupported`](crate::Outcome::Unsupported) without
/// touching `callback` when the host cannot observe performance entries.
pub fn on_fmp(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    if !session.timeline().supports_observer() {
        warn!("performance observation unsupported; FMP unavailable");
        return MetricHandle::unsupported();
    }
    let subscriptions = match FmpSubscriptions::open(session) {
        Ok(subscriptions) => subscriptions,
        Err(err) => {
            warn!("FMP observers could not be registered: {err}");
            return MetricHandle::unsupported();
        }
    };

    let (reporter, handle) = MetricHandle::channel(callback);
    let estimator = FmpEstimator {
        session: session.clone(),
        scorer: DomScorer::new(session.config().fmp.weights.clone()),
        deltas: ScoreDeltaFilter::default(),
        fcp_time: None,
        lcp_time: None,
        reporter,
    };
    tokio::spawn(estimator.run(subscriptions));
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, Outcome};
    use pagepulse_engine::adjustment_bounds;
    use pagepulse_page::ElementSpec;
    use pagepulse_types::{
        config::PulseConfig, entries::PerformanceEntry, layout::Rect, metrics::Rating,
    };
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };
    use tokio::time::sleep;

    #[test]
    fn delta_filter_keeps_first_of_equal_changes() {
        let mut filter = ScoreDeltaFilter::default();
        assert!(filter.observe(10.0, 100.0));
        assert!(!filter.observe(20.0, 200.0));
        assert!(!filter.observe(15.0, 300.0));
        assert!(filter.observe(40.0, 400.0));
        assert_eq!(filter.max_change(), 25.0);
        assert_eq!(filter.max_change_time(), 400.0);
        assert_eq!(filter.last_score(), 40.0);
    }

    #[test]
    fn delta_filter_counts_drops_as_changes() {
        let mut filter = ScoreDeltaFilter::default();
        filter.observe(50.0, 10.0);
        assert!(filter.observe(-10.0, 20.0));
        assert_eq!(filter.max_change(), 60.0);
        assert_eq!(filter.max_change_time(), 20.0);
    }

    #[tokio::test]
    async fn largest_layout_jump_sets_fmp_without_anchors() {
        tokio::time::pause();
        let page = testing::simulated_page();
        let handle = on_fmp(&page.session(PulseConfig::default()), None);

        sleep(Duration::from_millis(100)).await;
        page.append_element(None, ElementSpec::new("p", Rect::new(0.0, 0.0, 200.0, 20.0)))
            .expect("append paragraph");
        sleep(Duration::from_millis(500)).await;
        page.append_element(None, ElementSpec::new("img", Rect::new(0.0, 0.0, 1280.0, 800.0)))
            .expect("append hero");
        sleep(Duration::from_millis(400)).await;
        page.fire_load().expect("load");

        let metric = handle.await.reported().expect("fmp reported");
        assert_eq!(metric.name, MetricKind::Fmp);
        assert!((metric.value - 600.0).abs() < 1.0, "fmp = {}", metric.value);
        assert_eq!(metric.rating, Rating::Good);
    }

    #[tokio::test]
    async fn adjustment_stays_within_bounds_with_anchors() {
        tokio::time::pause();
        let page = testing::simulated_page();
        page.record_entry(PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 100.0))
            .expect("fcp");
        page.record_entry(PerformanceEntry::largest_contentful_paint(1_000.0))
            .expect("lcp");
        let handle = on_fmp(&page.session(PulseConfig::default()), None);

        sleep(Duration::from_millis(300)).await;
        page.append_element(None, ElementSpec::new("div", Rect::new(0.0, 0.0, 600.0, 400.0)))
            .expect("append");
        page.fire_load().expect("load");

        let metric = handle.await.reported().expect("fmp reported");
        let (low, high) = adjustment_bounds(Some(100.0), Some(1_000.0), None);
        assert!(metric.value >= 300.0 + low - 1.0, "fmp = {}", metric.value);
        assert!(metric.value <= 300.0 + high + 1.0, "fmp = {}", metric.value);
    }

    // A later FCP-named paint past LCP would flip the jitter negative and a
    // stale LCP would shrink the pull; either lands outside these bounds.
    #[tokio::test]
    async fn keeps_first_fcp_and_last_lcp() {
        tokio::time::pause();
        let page = testing::simulated_page();
        page.record_entry(PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 100.0))
            .expect("fcp");
        page.record_entry(PerformanceEntry::largest_contentful_paint(600.0))
            .expect("first lcp");
        let handle = on_fmp(&page.session(PulseConfig::default()), None);

        sleep(Duration::from_millis(200)).await;
        page.record_entry(PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 3_500.0))
            .expect("second fcp");
        page.record_entry(PerformanceEntry::largest_contentful_paint(3_000.0))
            .expect("second lcp");
        sleep(Duration::from_millis(100)).await;
        page.append_element(None, ElementSpec::new("div", Rect::new(0.0, 0.0, 600.0, 400.0)))
            .expect("append");
        page.fire_load().expect("load");

        let metric = handle.await.reported().expect("fmp reported");
        let raw = 300.0;
        let (low, high) = adjustment_bounds(Some(100.0), Some(3_000.0), None);
        assert!((low - 600.0).abs() < 1e-9 && (high - 1_470.0).abs() < 1e-9);
        assert!(metric.value >= raw + low - 1.0, "fmp = {}", metric.value);
        assert!(metric.value <= raw + high + 1.0, "fmp = {}", metric.value);
    }

    #[tokio::test]
    async fn settle_delay_follows_load() {
        tokio::time::pause();
        let page = testing::simulated_page();
        let handle = on_fmp(&page.session(PulseConfig::default()), None);
        sleep(Duration::from_millis(50)).await;
        page.append_element(None, ElementSpec::new("h1", Rect::new(0.0, 0.0, 300.0, 40.0)))
            .expect("append");
        sleep(Duration::from_millis(950)).await;
        page.fire_load().expect("load");

        let start = tokio::time::Instant::now();
        let metric = handle.await.reported().expect("fmp reported");
        let waited = start.elapsed();
        assert!(waited >= Duration::from_millis(4_000) && waited < Duration::from_millis(4_002));
        assert!((metric.value - 50.0).abs() < 1.0);
    }

    #[tokio::test]
    async fn unsupported_host_never_calls_back() {
        let page = testing::unobservable_page();
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let handle = on_fmp(
            &page.session(PulseConfig::default()),
            Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
        );
        assert_eq!(handle.await, Outcome::Unsupported);
        assert!(!called.load(Ordering::SeqCst));
    }
}
