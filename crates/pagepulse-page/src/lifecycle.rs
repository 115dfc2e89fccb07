use tokio::sync::watch;

/// Receiving side of the page lifecycle signals.
///
/// Waiting on a signal that already fired completes immediately.
#[derive(Debug, Clone)]
pub struct PageLifecycle {
    dom_content_loaded: watch::Receiver<bool>,
    loaded: watch::Receiver<bool>,
    hidden: watch::Receiver<bool>,
}

/// Host side that fires lifecycle signals exactly once each.
#[derive(Debug)]
pub struct LifecycleController {
    dom_content_loaded: watch::Sender<bool>,
    loaded: watch::Sender<bool>,
    hidden: watch::Sender<bool>,
}

pub fn lifecycle_channel() -> (LifecycleController, PageLifecycle) {
    let (dcl_tx, dcl_rx) = watch::channel(false);
    let (load_tx, load_rx) = watch::channel(false);
    let (hidden_tx, hidden_rx) = watch::channel(false);
    (
        LifecycleController {
            dom_content_loaded: dcl_tx,
            loaded: load_tx,
            hidden: hidden_tx,
        },
        PageLifecycle {
            dom_content_loaded: dcl_rx,
            loaded: load_rx,
            hidden: hidden_rx,
        },
    )
}

async fn wait_for_signal(mut rx: watch::Receiver<bool>) {
    if rx.wait_for(|fired| *fired).await.is_err() {
        // Host dropped without firing: the signal never arrives.
        futures::future::pending::<()>().await;
    }
}

impl PageLifecycle {
    pub async fn dom_content_loaded(&self) {
        wait_for_signal(self.dom_content_loaded.clone()).await
    }

    pub async fn loaded(&self) {
        wait_for_signal(self.loaded.clone()).await
    }

    pub async fn hidden(&self) {
        wait_for_signal(self.hidden.clone()).await
    }

    pub fn is_loaded(&self) -> bool {
        *self.loaded.borrow()
    }

    pub fn is_hidden(&self) -> bool {
        *self.hidden.borrow()
    }
}

impl LifecycleController {
    /// Returns `true` when this call fired the signal.
    pub fn fire_dom_content_loaded(&self) -> bool {
        !self.dom_content_loaded.send_replace(true)
    }

    pub fn fire_load(&self) -> bool {
        !self.loaded.send_replace(true)
    }

    pub fn fire_hidden(&self) -> bool {
        !self.hidden.send_replace(true)
    }
}
