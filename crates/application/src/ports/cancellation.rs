//! Cooperative cancellation shared by every await in a pipeline.

use std::sync::Arc;

use tokio::sync::watch;

/// Cancels one request pipeline. Clones share the same state.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationToken {
    /// Creates a token that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A receiver that can be awaited.
    #[must_use]
    pub fn receiver(&self) -> CancellationReceiver {
        CancellationReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        self.receiver().cancelled().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Awaitable side of a [`CancellationToken`].
#[derive(Debug, Clone)]
pub struct CancellationReceiver {
    rx: watch::Receiver<bool>,
}

impl CancellationReceiver {
    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested; never resolves otherwise.
    pub async fn cancelled(&mut self) {
        if *self.rx.borrow_and_update() {
            return;
        }
        while self.rx.changed().await.is_ok() {
            if *self.rx.borrow_and_update() {
                return;
            }
        }
        std::future::pending::<()>().await;
    }
}
