use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation shared between a caller and a running pass.
///
/// Fetches check it before they start and while backing off; work already
/// committed to the store stays valid. A request stops the pass in progress,
/// or the next one if none is running, and is cleared when that pass ends.
#[derive(Debug, Clone)]
pub struct Cancellation {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancellation {
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Clear a pending request so later passes run to completion.
    pub fn reset(&self) {
        self.sender.send_replace(false);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once `cancel` has been called on any clone.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        // The sender lives as long as `self`, so `changed` cannot fail here.
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}
