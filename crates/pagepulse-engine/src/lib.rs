//! Pure heuristics behind the paint and interactivity estimators.

pub mod adjustment;
pub mod dom_score;
pub mod quiet_window;

pub use adjustment::{adjustment_bounds, fmp_adjustment};
pub use dom_score::{compute_score, DomScorer, MISSING_NODE_SCORE};
pub use quiet_window::{find_last_long_task_before, find_quiet_window, QuietWindow, QuietWindowSearch};
