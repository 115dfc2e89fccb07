use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use pagepulse_types::metrics::MetricResult;
use tokio::sync::oneshot;

/// Optional completion callback, invoked with the same payload the handle resolves to.
pub type MetricCallback<T = MetricResult> = Box<dyn FnOnce(T) + Send + 'static>;

/// What a tracker's handle resolves to. It never fails.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Reported(T),
    /// The host lacks the observation capability the tracker needs.
    Unsupported,
    /// The tracker ran but had too little data to report.
    Skipped,
}

impl<T> Outcome<T> {
    pub fn reported(self) -> Option<T> {
        match self {
            Outcome::Reported(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_reported(&self) -> Option<&T> {
        match self {
            Outcome::Reported(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Outcome::Unsupported)
    }
}

enum HandleState<T> {
    Pending(oneshot::Receiver<T>),
    Unsupported,
}

/// Deferred single-resolution result of one tracker.
pub struct MetricHandle<T = MetricResult> {
    state: HandleState<T>,
}

impl<T> MetricHandle<T> {
    pub fn unsupported() -> Self {
        Self {
            state: HandleState::Unsupported,
        }
    }

    /// `true` for a handle that resolves without ever running a tracker.
    pub fn is_unsupported(&self) -> bool {
        matches!(self.state, HandleState::Unsupported)
    }

    pub fn channel(callback: Option<MetricCallback<T>>) -> (Reporter<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (
            Reporter { tx, callback },
            Self {
                state: HandleState::Pending(rx),
            },
        )
    }
}

impl<T> Future for MetricHandle<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.get_mut().state {
            HandleState::Unsupported => Poll::Ready(Outcome::Unsupported),
            HandleState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(value)) => Poll::Ready(Outcome::Reported(value)),
                Poll::Ready(Err(_)) => Poll::Ready(Outcome::Skipped),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}

/// Tracker-side half; consumed by the single report. Dropping it unreported
/// resolves the handle as [`Outcome::Skipped`].
pub struct Reporter<T> {
    tx: oneshot::Sender<T>,
    callback: Option<MetricCallback<T>>,
}

impl<T: Clone> Reporter<T> {
    pub fn report(self, value: T) {
        let callback_value = self.callback.as_ref().map(|_| value.clone());
        let _ = self.tx.send(value);
        if let (Some(callback), Some(value)) = (self.callback, callback_value) {
            callback(value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn report_resolves_handle_and_callback() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let (reporter, handle) = MetricHandle::<u32>::channel(Some(Box::new(move |value| {
            *sink.lock().expect("lock") = Some(value);
        })));
        reporter.report(7);
        assert_eq!(handle.await, Outcome::Reported(7));
        assert_eq!(*seen.lock().expect("lock"), Some(7));
    }

    #[tokio::test]
    async fn dropped_reporter_is_skipped() {
        let (reporter, handle) = MetricHandle::<u32>::channel(None);
        drop(reporter);
        assert_eq!(handle.await, Outcome::Skipped);
    }

    #[tokio::test]
    async fn unsupported_resolves_immediately() {
        let handle = MetricHandle::<u32>::unsupported();
        assert!(handle.await.is_unsupported());
    }
}
