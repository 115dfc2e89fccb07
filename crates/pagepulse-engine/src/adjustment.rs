//! Randomized correction that pulls the raw FMP estimate toward LCP.
//!
//! The output is intentionally non-deterministic; callers and tests should
//! reason about [`adjustment_bounds`] rather than exact values.

use rand::Rng;

/// Share of the FCP..LCP span used as the random jitter ceiling.
pub const MAX_DEVIATION_RATIO: f64 = 0.3;
/// Share of the remaining distance to LCP added unconditionally.
pub const LCP_PULL_RATIO: f64 = 0.2;

fn usable(time: Option<f64>) -> Option<f64> {
    time.filter(|t| *t != 0.0 && t.is_finite())
}

/// The pull is measured from the previously published FMP. The estimator
/// computes the adjustment before it has published anything, so an unset
/// estimate counts as 0 and the pull is a fixed share of LCP.
fn pull_towards_lcp(lcp: f64, prior_estimate: Option<f64>) -> f64 {
    (lcp - prior_estimate.unwrap_or(0.0)) * LCP_PULL_RATIO
}

/// Adjustment to add to the raw FMP; zero when either paint anchor is unknown.
pub fn fmp_adjustment<R: Rng + ?Sized>(
    fcp_time: Option<f64>,
    lcp_time: Option<f64>,
    prior_estimate: Option<f64>,
    rng: &mut R,
) -> f64 {
    let (Some(fcp), Some(lcp)) = (usable(fcp_time), usable(lcp_time)) else {
        return 0.0;
    };
    let max_deviation = (lcp - fcp) * MAX_DEVIATION_RATIO;
    let jitter = rng.gen::<f64>() * max_deviation;
    jitter + pull_towards_lcp(lcp, prior_estimate)
}

/// Closed range every [`fmp_adjustment`] draw falls into.
pub fn adjustment_bounds(
    fcp_time: Option<f64>,
    lcp_time: Option<f64>,
    prior_estimate: Option<f64>,
) -> (f64, f64) {
    let (Some(fcp), Some(lcp)) = (usable(fcp_time), usable(lcp_time)) else {
        return (0.0, 0.0);
    };
    let max_deviation = (lcp - fcp) * MAX_DEVIATION_RATIO;
    let towards_lcp = pull_towards_lcp(lcp, prior_estimate);
    let low = towards_lcp + max_deviation.min(0.0);
    let high = towards_lcp + max_deviation.max(0.0);
    (low, high)
}
