//! Branch-change notifications
//!
//! The engine publishes one event per tip change on a broadcast channel.
//! Subscribers hold a handle; dropping it deregisters the listener.

use ledgerlink_common::ChainLink;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// The active tip moved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchChange {
    /// `None` when the first tip (genesis) is established
    pub old_tip: Option<ChainLink>,
    pub new_tip: ChainLink,
    /// `None` exactly when `old_tip` is `None`
    pub common_ancestor: Option<ChainLink>,
}

impl BranchChange {
    /// True when the new tip does not extend the old one.
    pub fn is_reorg(&self) -> bool {
        match (&self.old_tip, &self.common_ancestor) {
            (Some(old), Some(ancestor)) => old.hash() != ancestor.hash(),
            _ => false,
        }
    }
}

/// Subscription ID
pub type SubscriptionId = u64;

/// Listener handle returned by [`EventPublisher::subscribe`].
pub struct BranchSubscription {
    id: SubscriptionId,
    receiver: broadcast::Receiver<BranchChange>,
}

impl BranchSubscription {
    /// Next event, or `None` once the publisher is gone. Events dropped because
    /// this listener fell behind are skipped with a warning.
    pub async fn recv(&mut self) -> Option<BranchChange> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!("Subscription {} lagged, {} branch changes dropped", self.id, missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<BranchChange> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(missed)) => {
                    warn!("Subscription {} lagged, {} branch changes dropped", self.id, missed);
                }
                Err(_) => return None,
            }
        }
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Explicit form of dropping the handle.
    pub fn unsubscribe(self) {
        debug!("Subscription removed: {}", self.id);
    }
}

/// Fan-out of branch changes to every live subscription.
pub struct EventPublisher {
    sender: broadcast::Sender<BranchChange>,
    next_id: AtomicU64,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self) -> BranchSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!("New subscription created: {}", id);
        BranchSubscription {
            id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn publish(&self, event: BranchChange) {
        if self.sender.send(event).is_err() {
            debug!("No subscribers to receive branch change");
        }
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}
