use std::collections::HashMap;

use pagepulse_page::{EntrySubscription, PageSession};
use pagepulse_types::{
    entries::{EntryFilter, EntryType, PerformanceEntry},
    metrics::{MetricKind, MetricResult},
};
use tracing::{debug, info, warn};

use crate::handle::{MetricCallback, MetricHandle, Reporter};

/// Longest duration seen per interaction id.
#[derive(Debug, Clone, Default)]
pub struct InteractionLog {
    longest: HashMap<u64, f64>,
}

impl InteractionLog {
    /// Entries without an interaction id (hover, scroll) are ignored.
    pub fn record(&mut self, entry: &PerformanceEntry) -> bool {
        let Some(id) = entry.interaction_id.filter(|id| *id > 0) else {
            return false;
        };
        let longest = self.longest.entry(id).or_insert(0.0);
        if entry.duration > *longest {
            *longest = entry.duration;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.longest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.longest.is_empty()
    }

    /// High-percentile interaction latency: one outlier is skipped for every
    /// 50 interactions.
    pub fn estimate(&self) -> Option<f64> {
        let mut durations: Vec<f64> = self.longest.values().copied().collect();
        durations.sort_by(|a, b| b.total_cmp(a));
        let last = durations.len().checked_sub(1)?;
        durations.get((durations.len() / 50).min(last)).copied()
    }
}

async fn track_interactions(
    session: PageSession,
    mut events: EntrySubscription,
    reporter: Reporter<MetricResult>,
) {
    let lifecycle = session.lifecycle().clone();
    let hidden = lifecycle.hidden();
    tokio::pin!(hidden);
    let mut log = InteractionLog::default();

    loop {
        tokio::select! {
            biased;
            batch = events.next_batch(), if events.is_connected() => {
                for entry in batch.iter().flatten() {
                    log.record(entry);
                }
            }
            _ = &mut hidden => break,
        }
    }
    events.disconnect();

    match log.estimate() {
        Some(value) => {
            let metric = MetricResult::rated(MetricKind::Inp, value, session.config().inp.thresholds);
            info!(
                interactions = log.len(),
                rating = metric.rating.as_str(),
                "INP {value:.1}ms"
            );
            reporter.report(metric);
        }
        None => debug!("no interactions before the page was hidden"),
    }
}

/// Interaction to Next Paint, reported when the page is hidden.
pub fn on_inp(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    if !session.timeline().supports_observer() {
        warn!("performance observation unsupported; INP unavailable");
        return MetricHandle::unsupported();
    }
    let events = match session
        .timeline()
        .observe(EntryFilter::single(EntryType::Event), true)
    {
        Ok(events) => events,
        Err(err) => {
            warn!("INP observer could not be registered: {err}");
            return MetricHandle::unsupported();
        }
    };
    let (reporter, handle) = MetricHandle::channel(callback);
    tokio::spawn(track_interactions(session.clone(), events, reporter));
    handle
}
