//! Cluster invalidation bus.
//!
//! When one node mutates a ticket, every other node holding that ticket in
//! its local cache must drop the stale entry. The bus carries small
//! [`TicketEvent`] messages describing each mutation; subscribers invalidate
//! the named cache entry (or everything, for a purge).
//!
//! Events are advisory. A lost event only means a cache entry survives until
//! its TTL margin elapses; correctness never depends on delivery, because
//! the registry re-checks the expiration policy against the store on fetch.
//!
//! Every event carries the `publisher_id` of the node that emitted it, so a
//! subscriber can skip events it published itself (it already invalidated
//! its own cache synchronously).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::RegistryResult;

/// Default capacity of the in-process broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// The mutation a [`TicketEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TicketOperation {
    /// A ticket was created or updated.
    Upsert,
    /// A ticket was deleted.
    Delete,
    /// Every ticket was deleted; subscribers drop their entire cache.
    Purge,
}

/// A cache invalidation event broadcast to the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEvent {
    /// The affected ticket id. `None` for [`TicketOperation::Purge`].
    pub ticket_id: Option<String>,
    /// What happened to the ticket.
    pub operation: TicketOperation,
    /// Identifier of the node that published the event.
    pub publisher_id: String,
}

impl TicketEvent {
    /// An upsert event for the given ticket.
    #[must_use]
    pub fn upsert(ticket_id: impl Into<String>, publisher_id: impl Into<String>) -> Self {
        Self {
            ticket_id: Some(ticket_id.into()),
            operation: TicketOperation::Upsert,
            publisher_id: publisher_id.into(),
        }
    }

    /// A delete event for the given ticket.
    #[must_use]
    pub fn delete(ticket_id: impl Into<String>, publisher_id: impl Into<String>) -> Self {
        Self {
            ticket_id: Some(ticket_id.into()),
            operation: TicketOperation::Delete,
            publisher_id: publisher_id.into(),
        }
    }

    /// A purge event covering every ticket.
    #[must_use]
    pub fn purge(publisher_id: impl Into<String>) -> Self {
        Self {
            ticket_id: None,
            operation: TicketOperation::Purge,
            publisher_id: publisher_id.into(),
        }
    }
}

/// Transport for cluster invalidation events.
///
/// Implementations must deliver events to all subscribers, including the
/// publisher's own subscription (echo suppression is the subscriber's job,
/// via `publisher_id`). Delivery is best-effort.
#[async_trait]
pub trait InvalidationBus: Send + Sync {
    /// Publishes an event to every subscriber in the cluster.
    #[must_use = "publish failures indicate the cluster may serve stale entries"]
    async fn publish(&self, event: TicketEvent) -> RegistryResult<()>;

    /// Opens a subscription delivering events published after this call.
    fn subscribe(&self) -> broadcast::Receiver<TicketEvent>;
}

/// In-process bus over a [`broadcast`] channel.
///
/// Suitable for tests and single-process deployments. Cross-node delivery
/// needs the Redis bus in `warden-registry-redis`. Cheaply cloneable;
/// clones share the channel.
#[derive(Clone)]
pub struct LocalBus {
    sender: broadcast::Sender<TicketEvent>,
}

impl LocalBus {
    /// Creates a bus with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a bus whose channel buffers up to `capacity` events per
    /// subscriber. Slow subscribers past the buffer see `Lagged` and should
    /// purge their cache.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvalidationBus for LocalBus {
    async fn publish(&self, event: TicketEvent) -> RegistryResult<()> {
        // A send error only means there are no subscribers right now.
        let _ = self.sender.send(event);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<TicketEvent> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_all_subscribers() {
        let bus = LocalBus::new();
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        bus.publish(TicketEvent::delete("TGT-1-a", "node-1")).await.unwrap();

        let event = sub1.recv().await.unwrap();
        assert_eq!(event.ticket_id.as_deref(), Some("TGT-1-a"));
        assert_eq!(event.operation, TicketOperation::Delete);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_ok() {
        let bus = LocalBus::new();
        bus.publish(TicketEvent::purge("node-1")).await.unwrap();
    }

    #[tokio::test]
    async fn subscription_starts_at_subscribe_time() {
        let bus = LocalBus::new();
        bus.publish(TicketEvent::upsert("ST-1-a", "node-1")).await.unwrap();

        let mut sub = bus.subscribe();
        bus.publish(TicketEvent::upsert("ST-2-b", "node-1")).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.ticket_id.as_deref(), Some("ST-2-b"));
    }

    #[test]
    fn event_serde_round_trip() {
        let event = TicketEvent::purge("node-7");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"purge\""));
        let back: TicketEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
