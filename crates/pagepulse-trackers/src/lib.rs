//! Metric trackers. Each factory subscribes synchronously, spawns one task,
//! and hands back a [`MetricHandle`] that resolves exactly once.

use std::time::Duration;

use pagepulse_page::PageLifecycle;
use tracing::debug;

pub mod fcp;
pub mod fmp;
pub mod fst;
pub mod handle;
pub mod inp;
pub mod lcp;
pub mod plt;
pub mod resource;
pub mod tti;

pub use fcp::on_fcp;
pub use fmp::{on_fmp, ScoreDeltaFilter};
pub use fst::on_fst;
pub use handle::{MetricCallback, MetricHandle, Outcome, Reporter};
pub use inp::{on_inp, InteractionLog};
pub use lcp::on_lcp;
pub use plt::on_plt;
pub use resource::{collect_resources, on_resource};
pub use tti::{estimate_tti, on_tti, TtiControl, TtiInputs, TtiTracker};

/// Resolves `delay` after the page's `load` event (immediately counted if it already fired).
pub(crate) async fn settle_after_load(lifecycle: PageLifecycle, delay: Duration) {
    lifecycle.loaded().await;
    debug!("load observed; settling for {}ms", delay.as_millis());
    tokio::time::sleep(delay).await;
}

/// Values a tracker may report: positive and finite.
pub(crate) fn is_reportable(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

#[cfg(test)]
pub(crate) mod testing {
    use pagepulse_page::{SimulatedPage, SimulatedPageConfig};

    pub fn simulated_page() -> SimulatedPage {
        SimulatedPage::new(SimulatedPageConfig::default())
    }

    pub fn unobservable_page() -> SimulatedPage {
        SimulatedPage::new(SimulatedPageConfig {
            supports_observer: false,
            ..SimulatedPageConfig::default()
        })
    }
}
