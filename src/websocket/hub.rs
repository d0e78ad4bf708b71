use dashmap::DashMap;
use serde::Serialize;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Change notifications pushed to connected browsers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    ComplaintCreated {
        complaint_id: Uuid,
    },
    ComplaintAccepted {
        complaint_id: Uuid,
        ngo_id: Uuid,
        message: String,
    },
    CompletionUploaded {
        complaint_id: Uuid,
        ngo_id: Uuid,
    },
    ComplaintCompleted {
        complaint_id: Uuid,
    },
}

type Sender = mpsc::UnboundedSender<FeedEvent>;

/// Per-user fan-out of [`FeedEvent`]s. Delivery is best-effort: closed
/// receivers are pruned on the next send.
#[derive(Clone, Default)]
pub struct ChangeFeed {
    connections: Arc<DashMap<Uuid, Vec<(u64, Sender)>>>,
    next_conn_id: Arc<AtomicU64>,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, user_id: Uuid) -> Subscription {
        let conn_id = self.next_conn_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections
            .entry(user_id)
            .or_default()
            .push((conn_id, tx));

        Subscription {
            user_id,
            conn_id,
            rx,
            feed: self.clone(),
        }
    }

    fn remove(&self, user_id: Uuid, conn_id: u64) {
        if let Some(mut senders) = self.connections.get_mut(&user_id) {
            senders.retain(|(id, _)| *id != conn_id);
            if senders.is_empty() {
                drop(senders);
                self.connections.remove_if(&user_id, |_, s| s.is_empty());
            }
        }
    }

    /// Returns how many live subscriptions received the event.
    pub fn send_to_user(&self, user_id: Uuid, event: &FeedEvent) -> usize {
        let mut delivered = 0;
        if let Some(mut senders) = self.connections.get_mut(&user_id) {
            senders.retain(|(conn_id, sender)| {
                let ok = sender.send(event.clone()).is_ok();
                if ok {
                    delivered += 1;
                } else {
                    tracing::debug!("Pruning closed subscription {} for {}", conn_id, user_id);
                }
                ok
            });
            if senders.is_empty() {
                drop(senders);
                self.connections.remove_if(&user_id, |_, s| s.is_empty());
            }
        }
        delivered
    }

    pub fn broadcast(&self, event: &FeedEvent) -> usize {
        let mut delivered = 0;
        self.connections.retain(|_, senders| {
            senders.retain(|(_, sender)| {
                let ok = sender.send(event.clone()).is_ok();
                delivered += usize::from(ok);
                ok
            });
            !senders.is_empty()
        });
        delivered
    }

    /// Close every subscription a user holds, e.g. after sign-out.
    pub fn disconnect_user(&self, user_id: Uuid) -> usize {
        self.connections
            .remove(&user_id)
            .map(|(_, senders)| senders.len())
            .unwrap_or(0)
    }

    pub fn subscriber_count(&self, user_id: Uuid) -> usize {
        self.connections
            .get(&user_id)
            .map(|senders| senders.len())
            .unwrap_or(0)
    }
}

/// Handle for one subscription. Dropping it unsubscribes.
pub struct Subscription {
    user_id: Uuid,
    conn_id: u64,
    rx: mpsc::UnboundedReceiver<FeedEvent>,
    feed: ChangeFeed,
}

impl Subscription {
    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    /// Next event, or `None` once the feed closed this subscription.
    pub async fn recv(&mut self) -> Option<FeedEvent> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.feed.remove(self.user_id, self.conn_id);
    }
}
