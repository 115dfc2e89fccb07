use tokio::sync::mpsc;

/// Receiving half of a host observer registration.
///
/// `disconnect` is idempotent; once disconnected (or once the host side goes
/// away) no further batches are yielded.
#[derive(Debug)]
pub struct Subscription<T> {
    rx: mpsc::UnboundedReceiver<T>,
    connected: bool,
}

/// Host-side handle used to deliver batches to one subscriber.
#[derive(Debug, Clone)]
pub struct BatchSender<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> BatchSender<T> {
    /// Returns `false` once the subscriber is gone.
    pub fn deliver(&self, batch: T) -> bool {
        self.tx.send(batch).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub fn subscription_channel<T>() -> (BatchSender<T>, Subscription<T>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        BatchSender { tx },
        Subscription {
            rx,
            connected: true,
        },
    )
}

impl<T> Subscription<T> {
    pub async fn next_batch(&mut self) -> Option<T> {
        if !self.connected {
            return None;
        }
        match self.rx.recv().await {
            Some(batch) => Some(batch),
            None => {
                self.connected = false;
                None
            }
        }
    }

    /// Non-blocking drain of whatever is already queued.
    pub fn try_next_batch(&mut self) -> Option<T> {
        if !self.connected {
            return None;
        }
        self.rx.try_recv().ok()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.rx.close();
        }
    }
}
