//! Notification fan-out hub
//!
//! Registry mapping group id to the set of currently-interested subscribers.
//! Publish operates on a snapshot of the subscriber set taken under the
//! lock and delivers outside it, best-effort: a subscriber whose channel is
//! full or closed is dropped from the registry rather than awaited.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use crate::models::ViolationEvent;

/// Per-subscriber event channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

pub type SubscriberId = u64;

/// Group-keyed publish/subscribe registry
pub struct Hub {
    subscribers: RwLock<HashMap<String, HashMap<SubscriberId, mpsc::Sender<ViolationEvent>>>>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Hub {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            channel_capacity,
        }
    }

    /// Allocate a subscriber id and its event channel. One connection holds
    /// one channel and registers its sender under any number of groups.
    pub fn register(&self) -> (SubscriberId, mpsc::Sender<ViolationEvent>, mpsc::Receiver<ViolationEvent>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(self.channel_capacity);
        (id, tx, rx)
    }

    pub async fn subscribe(
        &self,
        group_id: &str,
        id: SubscriberId,
        tx: mpsc::Sender<ViolationEvent>,
    ) {
        let mut subscribers = self.subscribers.write().await;
        subscribers
            .entry(group_id.to_string())
            .or_default()
            .insert(id, tx);
        debug!(group_id = %group_id, subscriber = id, "Subscriber added");
    }

    pub async fn unsubscribe(&self, group_id: &str, id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        if let Some(group) = subscribers.get_mut(group_id) {
            group.remove(&id);
            if group.is_empty() {
                subscribers.remove(group_id);
            }
        }
        debug!(group_id = %group_id, subscriber = id, "Subscriber removed");
    }

    /// Remove a subscriber from every group (connection closed)
    pub async fn drop_subscriber(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.write().await;
        subscribers.retain(|_, group| {
            group.remove(&id);
            !group.is_empty()
        });
    }

    /// Number of subscribers currently registered for a group
    pub async fn subscriber_count(&self, group_id: &str) -> usize {
        let subscribers = self.subscribers.read().await;
        subscribers.get(group_id).map(|g| g.len()).unwrap_or(0)
    }

    /// Deliver an event to every subscriber registered for the group at call
    /// time. Returns the number of successful deliveries.
    pub async fn publish(&self, group_id: &str, event: ViolationEvent) -> usize {
        // Snapshot under the read lock; deliver after releasing it
        let snapshot: Vec<(SubscriberId, mpsc::Sender<ViolationEvent>)> = {
            let subscribers = self.subscribers.read().await;
            match subscribers.get(group_id) {
                Some(group) => group.iter().map(|(id, tx)| (*id, tx.clone())).collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        let mut dead: Vec<SubscriberId> = Vec::new();

        for (id, tx) in snapshot {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(group_id = %group_id, subscriber = id, "Dropping slow subscriber");
                    dead.push(id);
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    dead.push(id);
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write().await;
            if let Some(group) = subscribers.get_mut(group_id) {
                for id in dead {
                    group.remove(&id);
                }
                if group.is_empty() {
                    subscribers.remove(group_id);
                }
            }
        }

        debug!(group_id = %group_id, delivered, "Published violation event");
        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(group_id: &str) -> ViolationEvent {
        ViolationEvent {
            violation_id: "v1".to_string(),
            group_id: group_id.to_string(),
            group_name: "Test Group".to_string(),
            member_id: "m1".to_string(),
            member_name: "Alice".to_string(),
            rule_id: "r1".to_string(),
            rule_label: "no swearing".to_string(),
            source_post_id: Some("p1".to_string()),
            source_post_text: Some("oh dang".to_string()),
            detail: "Banned terms found: dang".to_string(),
            penalty: 0.002,
            detected_at: 1_700_000_000_000,
        }
    }

    #[tokio::test]
    async fn subscriber_receives_events_for_its_group_only() {
        let hub = Hub::default();

        let (id_a, tx_a, mut rx_a) = hub.register();
        let (id_b, tx_b, mut rx_b) = hub.register();
        hub.subscribe("g1", id_a, tx_a).await;
        hub.subscribe("g2", id_b, tx_b).await;

        let delivered = hub.publish("g1", event("g1")).await;
        assert_eq!(delivered, 1);

        let received = rx_a.recv().await.unwrap();
        assert_eq!(received.group_id, "g1");
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = Hub::default();

        let (id, tx, mut rx) = hub.register();
        hub.subscribe("g1", id, tx).await;
        hub.unsubscribe("g1", id).await;

        assert_eq!(hub.publish("g1", event("g1")).await, 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.subscriber_count("g1").await, 0);
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_not_awaited() {
        let hub = Hub::new(1);

        let (id, tx, _rx) = hub.register();
        hub.subscribe("g1", id, tx).await;

        // First publish fills the single-slot channel; the second finds it
        // full and evicts the subscriber instead of blocking.
        assert_eq!(hub.publish("g1", event("g1")).await, 1);
        assert_eq!(hub.publish("g1", event("g1")).await, 0);
        assert_eq!(hub.subscriber_count("g1").await, 0);
    }

    #[tokio::test]
    async fn closed_subscriber_is_pruned_on_publish() {
        let hub = Hub::default();

        let (id, tx, rx) = hub.register();
        hub.subscribe("g1", id, tx).await;
        drop(rx);

        assert_eq!(hub.publish("g1", event("g1")).await, 0);
        assert_eq!(hub.subscriber_count("g1").await, 0);
    }

    #[tokio::test]
    async fn drop_subscriber_removes_from_all_groups() {
        let hub = Hub::default();

        let (id, tx, _rx) = hub.register();
        hub.subscribe("g1", id, tx.clone()).await;
        hub.subscribe("g2", id, tx).await;

        hub.drop_subscriber(id).await;
        assert_eq!(hub.subscriber_count("g1").await, 0);
        assert_eq!(hub.subscriber_count("g2").await, 0);
    }
}
