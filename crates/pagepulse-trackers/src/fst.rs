use pagepulse_page::{EntrySubscription, MutationObserverInit, MutationSubscription, PageSession};
use pagepulse_types::{
    entries::{EntryFilter, EntryType},
    metrics::{MetricKind, MetricResult},
    Result,
};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::{
    handle::{MetricCallback, MetricHandle, Reporter},
    is_reportable,
};

fn open(session: &PageSession) -> Result<(MutationSubscription, EntrySubscription)> {
    let init = match session.document().body() {
        Some(body) => MutationObserverInit::child_list_under(body),
        None => MutationObserverInit::document_wide(),
    };
    let mutations = session.mutations().observe_mutations(init)?;
    let resources = session
        .timeline()
        .observe(EntryFilter::single(EntryType::Resource), true)?;
    Ok((mutations, resources))
}

async fn watch_first_screen(
    session: PageSession,
    mut mutations: MutationSubscription,
    mut resources: EntrySubscription,
    reporter: Reporter<MetricResult>,
) {
    let config = &session.config().fst;
    let window = config.stable_window();
    let stable = sleep(window);
    tokio::pin!(stable);
    let mut last_change = session.now();
    let mut last_image: Option<f64> = None;

    loop {
        tokio::select! {
            biased;
            batch = mutations.next_batch(), if mutations.is_connected() => {
                if batch.is_some() {
                    last_change = session.now();
                    stable.as_mut().reset(Instant::now() + window);
                }
            }
            batch = resources.next_batch(), if resources.is_connected() => {
                let images = batch
                    .iter()
                    .flatten()
                    .filter(|entry| entry.initiator_type.as_deref() == Some("img"))
                    .map(|entry| entry.response_end_or_duration());
                for response_end in images {
                    last_image = Some(last_image.map_or(response_end, |seen| seen.max(response_end)));
                }
            }
            _ = &mut stable => break,
        }
    }
    mutations.disconnect();
    resources.disconnect();
    debug!(last_change, ?last_image, "first screen stable");

    let value = last_image.map_or(last_change, |image| image.max(last_change));
    if !is_reportable(value) {
        warn!("FST skipped: no DOM activity before the first screen settled");
        return;
    }
    let metric = MetricResult::rated(MetricKind::Fst, value, config.thresholds);
    info!(rating = metric.rating.as_str(), "FST {value:.1}ms");
    reporter.report(metric);
}

/// First Screen Time: the moment the body stops changing, or the last image
/// finished loading, whichever is later.
pub fn on_fst(session: &PageSession, callback: Option<MetricCallback>) -> MetricHandle {
    if !session.timeline().supports_observer() {
        warn!("performance observation unsupported; FST unavailable");
        return MetricHandle::unsupported();
    }
    let (mutations, resources) = match open(session) {
        Ok(subscriptions) => subscriptions,
        Err(err) => {
            warn!("FST observers could not be registered: {err}");
            return MetricHandle::unsupported();
        }
    };
    let (reporter, handle) = MetricHandle::channel(callback);
    tokio::spawn(watch_first_screen(session.clone(), mutations, resources, reporter));
    handle
}
