use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::{MetricResult, MetricsSummary, ResourceMetric};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Metric,
    Resources,
    Summary,
}

/// Immutable event envelope for logging, reporting, and replay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Metric(MetricResult),
    Resources(Vec<ResourceMetric>),
    Summary(MetricsSummary),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub phase: LifecyclePhase,
    pub details: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum LifecyclePhase {
    MonitorStart,
    DomContentLoaded,
    Load,
    Hidden,
    MonitorEnd,
}

impl MetricEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn metric(metric: MetricResult) -> Self {
        Self::new(EventKind::Metric, EventPayload::Metric(metric))
    }

    pub fn resources(resources: Vec<ResourceMetric>) -> Self {
        Self::new(EventKind::Resources, EventPayload::Resources(resources))
    }

    pub fn summary(summary: MetricsSummary) -> Self {
        Self::new(EventKind::Summary, EventPayload::Summary(summary))
    }

    pub fn lifecycle(phase: LifecyclePhase, details: Option<String>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent { phase, details }),
        )
    }
}
