use thiserror::Error;

use crate::metrics::MetricKind;

pub type Result<T, E = PulseError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum PulseError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("capability unavailable: {0}")]
    Capability(String),
    #[error("subscription error: {0}")]
    Subscription(String),
    #[error("scenario error: {0}")]
    Scenario(String),
    #[error("report error: {0}")]
    Report(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error("metrics incomplete, missing: {missing:?}")]
    Incomplete { missing: Vec<MetricKind> },
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
