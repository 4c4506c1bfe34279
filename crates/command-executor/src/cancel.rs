//! Cooperative cancellation shared between a caller and an in-flight run

use async_channel::{Receiver, Sender};
use std::sync::Arc;

/// A cloneable cancellation signal.
///
/// Every clone observes the same state. Cancelling is one-way and wakes all
/// tasks waiting in [`cancelled`](Self::cancelled). The signal is carried by
/// closing an `async_channel`, so it works under any executor.
#[derive(Debug, Clone)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    trigger: Sender<()>,
    signal: Receiver<()>,
}

impl CancellationToken {
    /// Create a token that is not cancelled
    pub fn new() -> Self {
        let (trigger, signal) = async_channel::bounded(1);
        Self {
            inner: Arc::new(Inner { trigger, signal }),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.trigger.close();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.inner.trigger.is_closed()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        // Nothing is ever sent, so recv only returns once the channel closes.
        let _ = self.inner.signal.recv().await;
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}
