//! Reporting facade: where finished metrics are published.

use async_trait::async_trait;
use futures::{stream::BoxStream, StreamExt};
use pagepulse_types::{events::MetricEvent, PulseError, Result};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, info};

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn run(&self) -> Result<()>;
    async fn publish(&self, event: MetricEvent) -> Result<()>;
    fn subscribe(&self) -> BoxStream<'static, MetricEvent>;
}

/// In-process bus backed by a broadcast channel. Events published while no
/// one is subscribed are dropped.
#[derive(Clone)]
pub struct LocalBus {
    tx: broadcast::Sender<MetricEvent>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl ReportSink for LocalBus {
    async fn run(&self) -> Result<()> {
        info!("Starting local report bus");
        Ok(())
    }

    async fn publish(&self, event: MetricEvent) -> Result<()> {
        let _ = self.tx.send(event);
        Ok(())
    }

    fn subscribe(&self) -> BoxStream<'static, MetricEvent> {
        BroadcastStream::new(self.tx.subscribe())
            .filter_map(|event| async move { event.ok() })
            .boxed()
    }
}

/// Writes every event to the log as one JSON line, then forwards it to an
/// inner bus so subscribers still see it.
#[derive(Clone)]
pub struct JsonLogSink {
    bus: LocalBus,
}

impl JsonLogSink {
    pub fn new(bus: LocalBus) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl ReportSink for JsonLogSink {
    async fn run(&self) -> Result<()> {
        debug!("JSON log sink ready");
        self.bus.run().await
    }

    async fn publish(&self, event: MetricEvent) -> Result<()> {
        let line = serde_json::to_string(&event)
            .map_err(|err| report_error(format!("failed to encode event {}: {err}", event.id)))?;
        info!(target: "pagepulse::report", "{line}");
        self.bus.publish(event).await
    }

    fn subscribe(&self) -> BoxStream<'static, MetricEvent> {
        self.bus.subscribe()
    }
}

pub fn report_error(message: impl Into<String>) -> PulseError {
    PulseError::Report(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pagepulse_types::{
        events::{EventKind, EventPayload},
        metrics::{MetricKind, MetricResult, Thresholds},
    };

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = LocalBus::new(8);
        let mut stream = bus.subscribe();
        let metric = MetricResult::rated(MetricKind::Fcp, 900.0, Thresholds::new(1_800.0, 3_000.0));
        bus.publish(MetricEvent::metric(metric.clone()))
            .await
            .expect("publish");

        let event = stream.next().await.expect("event");
        assert_eq!(event.kind, EventKind::Metric);
        match event.payload {
            EventPayload::Metric(received) => assert_eq!(received, metric),
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn publishing_without_subscribers_is_fine() {
        let bus = LocalBus::new(0);
        assert_eq!(bus.subscriber_count(), 0);
        bus.publish(MetricEvent::lifecycle(
            pagepulse_types::events::LifecyclePhase::MonitorStart,
            None,
        ))
        .await
        .expect("publish");
    }

    #[tokio::test]
    async fn json_sink_forwards_to_bus() {
        let sink = JsonLogSink::new(LocalBus::new(4));
        let mut stream = sink.subscribe();
        sink.run().await.expect("run");
        let metric = MetricResult::rated(MetricKind::Tti, 2_000.0, Thresholds::new(2_500.0, 3_200.0));
        sink.publish(MetricEvent::metric(metric)).await.expect("publish");
        assert_eq!(stream.next().await.map(|event| event.kind), Some(EventKind::Metric));
    }
}
