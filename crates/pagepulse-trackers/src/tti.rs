use pagepulse_engine::{find_last_long_task_before, QuietWindowSearch};
use pagepulse_page::{EntrySubscription, PageSession};
use pagepulse_types::{
    config::TtiConfig,
    entries::{EntryFilter, EntryType, LongTaskEntry, NetworkRequestEntry, PerformanceEntry},
    metrics::{MetricKind, MetricResult},
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    fcp::on_fcp,
    handle::{MetricCallback, MetricHandle, Reporter},
    is_reportable, settle_after_load,
};

#[derive(Debug, Clone, Copy)]
enum Anchor {
    Fcp(f64),
    Fmp(f64),
}

/// Setter side of a running TTI tracker. Values sent after the tracker has
/// finished are dropped.
#[derive(Debug, Clone)]
pub struct TtiControl {
    anchors: mpsc::UnboundedSender<Anchor>,
}

impl TtiControl {
    pub fn set_fcp_time(&self, time: f64) {
        let _ = self.anchors.send(Anchor::Fcp(time));
    }

    pub fn set_fmp_time(&self, time: f64) {
        let _ = self.anchors.send(Anchor::Fmp(time));
    }
}

/// Everything accumulated for one TTI calculation.
#[derive(Debug, Clone, Default)]
pub struct TtiInputs {
    pub long_tasks: Vec<LongTaskEntry>,
    pub network_requests: Vec<NetworkRequestEntry>,
    pub fcp_time: Option<f64>,
    pub fmp_time: Option<f64>,
}

impl TtiInputs {
    pub fn ingest(&mut self, entries: &[PerformanceEntry]) {
        for entry in entries {
            match entry.entry_type {
                EntryType::LongTask => self.long_tasks.push(entry.into()),
                EntryType::Resource => self.network_requests.push(entry.into()),
                _ => {}
            }
        }
    }

    /// FMP when known, otherwise FCP.
    pub fn anchor(&self) -> Option<f64> {
        self.fmp_time
            .filter(|time| is_reportable(*time))
            .or(self.fcp_time.filter(|time| is_reportable(*time)))
    }
}

/// Quiet-window TTI estimate, clamped so it never precedes DOMContentLoaded.
/// `None` when there is no anchor to search from.
pub fn estimate_tti(
    inputs: &TtiInputs,
    config: &TtiConfig,
    now: f64,
    dom_content_loaded: Option<f64>,
) -> Option<f64> {
    let start = inputs.anchor()?;
    let search = QuietWindowSearch::new(config.search_step_ms, config.max_active_requests);
    let tti = match search.find(
        start,
        config.quiet_window_ms,
        now,
        &inputs.long_tasks,
        &inputs.network_requests,
    ) {
        None => {
            debug!("no quiet window after {start:.1}ms; falling back to anchor");
            start
        }
        Some(window) => find_last_long_task_before(window.end, &inputs.long_tasks)
            .map(LongTaskEntry::end_time)
            .unwrap_or(start),
    };

    match dom_content_loaded {
        Some(dcl) if tti < dcl => Some(dcl),
        _ => Some(tti),
    }
}

/// Time to Interactive tracker; anchors arrive through [`TtiControl`].
pub struct TtiTracker {
    session: PageSession,
    inputs: TtiInputs,
    reporter: Reporter<MetricResult>,
}

impl TtiTracker {
    /// Starts collecting long tasks and resources right away.
    pub fn spawn(session: &PageSession, callback: Option<MetricCallback>) -> (TtiControl, MetricHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let control = TtiControl { anchors: tx };
        if !session.timeline().supports_observer() {
            warn!("performance observation unsupported; TTI unavailable");
            return (control, MetricHandle::unsupported());
        }
        let filter = EntryFilter::of(&[EntryType::LongTask, EntryType::Resource]);
        let entries = match session.timeline().observe(filter, true) {
            Ok(entries) => entries,
            Err(err) => {
                warn!("TTI observer could not be registered: {err}");
                return (control, MetricHandle::unsupported());
            }
        };

        let (reporter, handle) = MetricHandle::channel(callback);
        let tracker = Self {
            session: session.clone(),
            inputs: TtiInputs::default(),
            reporter,
        };
        tokio::spawn(tracker.run(entries, rx));
        (control, handle)
    }

    async fn run(mut self, mut entries: EntrySubscription, mut anchors: mpsc::UnboundedReceiver<Anchor>) {
        let settle = settle_after_load(
            self.session.lifecycle().clone(),
            self.session.config().tti.settle_delay(),
        );
        tokio::pin!(settle);
        let mut anchors_open = true;

        loop {
            tokio::select! {
                biased;
                batch = entries.next_batch(), if entries.is_connected() => {
                    if let Some(batch) = batch {
                        self.inputs.ingest(&batch);
                    }
                }
                anchor = anchors.recv(), if anchors_open => match anchor {
                    Some(anchor) => self.apply(anchor),
                    None => anchors_open = false,
                },
                _ = &mut settle => break,
            }
        }

        entries.disconnect();
        while let Ok(anchor) = anchors.try_recv() {
            self.apply(anchor);
        }
        self.calculate();
    }

    fn apply(&mut self, anchor: Anchor) {
        match anchor {
            Anchor::Fcp(time) => self.inputs.fcp_time = Some(time),
            Anchor::Fmp(time) => self.inputs.fmp_time = Some(time),
        }
        debug!(?anchor, "TTI anchor updated");
    }

    fn calculate(self) {
        let config = &self.session.config().tti;
        let dcl = self
            .session
            .navigation_timing()
            .and_then(|timing| timing.dom_content_loaded_offset());
        let Some(tti) = estimate_tti(&self.inputs, config, self.session.now(), dcl) else {
            warn!("TTI skipped: neither FMP nor FCP time is known");
            return;
        };
        if !is_reportable(tti) {
            warn!("TTI skipped: estimate {tti} is not a usable time");
            return;
        }

        let metric = MetricResult::rated(MetricKind::Tti, tti, config.thresholds);
        info!(
            long_tasks = self.inputs.long_tasks.len(),
            requests = self.inputs.network_requests.len(),
            rating = metric.rating.as_str(),
            "TTI estimated at {tti:.1}ms"
        );
        self.reporter.report(metric);
    }
}

/// TTI anchored on this session's own FCP. Callers that also know FMP should
/// use [`TtiTracker::spawn`] and feed both anchors.
pub fn on_tti(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    let (control, handle) = TtiTracker::spawn(session, callback);
    if handle.is_unsupported() {
        return handle;
    }
    // The FCP handle is not awaited; only its callback matters here.
    let _ = on_fcp(
        session,
        Some(Box::new(move |fcp: MetricResult| control.set_fcp_time(fcp.value))),
    );
    handle
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{testing, Outcome};
    use pagepulse_types::{
        config::PulseConfig,
        entries::{PerformanceEntry, FIRST_CONTENTFUL_PAINT},
        metrics::Rating,
    };
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Duration,
    };
    use tokio::time::sleep;

    fn inputs_with_anchor(fcp: f64) -> TtiInputs {
        TtiInputs {
            fcp_time: Some(fcp),
            ..TtiInputs::default()
        }
    }

    #[test]
    fn anchor_prefers_fmp() {
        let mut inputs = inputs_with_anchor(300.0);
        assert_eq!(inputs.anchor(), Some(300.0));
        inputs.fmp_time = Some(700.0);
        assert_eq!(inputs.anchor(), Some(700.0));
        inputs.fmp_time = Some(0.0);
        assert_eq!(inputs.anchor(), Some(300.0));
    }

    #[test]
    fn no_anchor_means_no_estimate() {
        let config = TtiConfig::default();
        assert_eq!(estimate_tti(&TtiInputs::default(), &config, 20_000.0, None), None);
    }

    #[test]
    fn quiet_page_is_interactive_at_anchor() {
        let config = TtiConfig::default();
        let tti = estimate_tti(&inputs_with_anchor(500.0), &config, 9_000.0, Some(200.0));
        assert_eq!(tti, Some(500.0));
    }

    #[test]
    fn last_long_task_before_window_ends_tti() {
        let config = TtiConfig::default();
        let mut inputs = inputs_with_anchor(500.0);
        inputs.long_tasks = vec![LongTaskEntry::new(600.0, 80.0), LongTaskEntry::new(900.0, 100.0)];
        assert_eq!(estimate_tti(&inputs, &config, 10_000.0, None), Some(1_000.0));
    }

    #[test]
    fn clamps_to_dom_content_loaded() {
        let config = TtiConfig::default();
        let mut inputs = inputs_with_anchor(500.0);
        inputs.long_tasks = vec![LongTaskEntry::new(900.0, 100.0)];
        assert_eq!(estimate_tti(&inputs, &config, 10_000.0, Some(1_500.0)), Some(1_500.0));
    }

    #[test]
    fn no_quiet_window_falls_back_to_anchor() {
        let config = TtiConfig::default();
        let inputs = inputs_with_anchor(500.0);
        assert_eq!(estimate_tti(&inputs, &config, 2_000.0, None), Some(500.0));
    }

    #[test]
    fn ingest_splits_entry_types() {
        let mut inputs = TtiInputs::default();
        inputs.ingest(&[
            PerformanceEntry::long_task(100.0, 60.0),
            PerformanceEntry::resource("/app.js", 10.0, 90.0, Some("script".into())),
            PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 40.0),
        ]);
        assert_eq!(inputs.long_tasks, vec![LongTaskEntry::new(100.0, 60.0)]);
        assert_eq!(inputs.network_requests, vec![NetworkRequestEntry::new(10.0, 90.0)]);
    }

    #[tokio::test]
    async fn fcp_anchor_yields_good_tti_on_quiet_page() {
        tokio::time::pause();
        let page = testing::simulated_page();
        page.record_entry(PerformanceEntry::paint(FIRST_CONTENTFUL_PAINT, 500.0))
            .expect("fcp");
        let handle = on_tti(&page.session(PulseConfig::default()), None);

        sleep(Duration::from_millis(400)).await;
        page.fire_load().expect("load");

        let metric = handle.await.reported().expect("tti reported");
        assert_eq!(metric.name, MetricKind::Tti);
        assert_eq!(metric.value, 500.0);
        assert_eq!(metric.rating, Rating::Good);
    }

    #[tokio::test]
    async fn tti_never_precedes_dom_content_loaded() {
        tokio::time::pause();
        let page = testing::simulated_page();
        let (control, handle) = TtiTracker::spawn(&page.session(PulseConfig::default()), None);
        control.set_fcp_time(500.0);
        page.record_entry(PerformanceEntry::long_task(900.0, 100.0))
            .expect("long task");

        sleep(Duration::from_millis(1_500)).await;
        page.fire_dom_content_loaded().expect("dcl");
        sleep(Duration::from_millis(100)).await;
        page.fire_load().expect("load");

        let metric = handle.await.reported().expect("tti reported");
        assert!((metric.value - 1_500.0).abs() < 1.0, "tti = {}", metric.value);
        assert_eq!(metric.rating, Rating::Good);
    }

    #[tokio::test]
    async fn fmp_anchor_overrides_fcp() {
        tokio::time::pause();
        let page = testing::simulated_page();
        let (control, handle) = TtiTracker::spawn(&page.session(PulseConfig::default()), None);
        control.set_fcp_time(300.0);
        control.set_fmp_time(800.0);
        sleep(Duration::from_millis(200)).await;
        page.fire_load().expect("load");

        let metric = handle.await.reported().expect("tti reported");
        assert_eq!(metric.value, 800.0);
    }

    #[tokio::test]
    async fn missing_anchor_skips() {
        tokio::time::pause();
        let page = testing::simulated_page();
        let (_control, handle) = TtiTracker::spawn(&page.session(PulseConfig::default()), None);
        page.fire_load().expect("load");
        assert_eq!(handle.await, Outcome::Skipped);
    }

    #[tokio::test]
    async fn unsupported_host_never_calls_back() {
        let page = testing::unobservable_page();
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let handle = on_tti(
            &page.session(PulseConfig::default()),
            Some(Box::new(move |_| flag.store(true, Ordering::SeqCst))),
        );
        assert_eq!(handle.await, Outcome::Unsupported);
        assert!(!called.load(Ordering::SeqCst));
    }
}
