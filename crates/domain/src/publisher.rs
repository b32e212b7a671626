//! Outbound domain notifications.
//!
//! Services emit a `(topic, payload)` pair after each state change has been
//! persisted. Delivery is fire-and-forget: a sink that cannot deliver logs
//! and moves on, and the originating command still succeeds. The event store
//! stays the source of truth.

use std::collections::VecDeque;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

pub mod topics {
    pub const INVENTORY_CREATED: &str = "inventory.created";
    pub const INVENTORY_UPDATED: &str = "inventory.updated";
    pub const INVENTORY_TRANSACTION_CREATED: &str = "inventory.transaction.created";

    pub const ORDER_CREATED: &str = "order.created";
    pub const ORDER_STATUS_CHANGED: &str = "order.status.changed";

    pub const PURCHASE_ORDER_CREATED: &str = "purchase-orders.created";
    pub const PURCHASE_ORDER_UPDATED: &str = "purchase-orders.updated";
    pub const PURCHASE_ORDER_STATUS_UPDATED: &str = "purchase-orders.status-updated";
    pub const PURCHASE_ORDER_ITEM_RECEIVED: &str = "purchase-orders.item-received";
    pub const PURCHASE_ORDER_CANCELLED: &str = "purchase-orders.cancelled";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, topic: &str, payload: serde_json::Value);
}

/// Serializes `payload` and publishes it, logging instead of failing.
pub async fn publish_json<T: Serialize + Sync>(
    publisher: &dyn EventPublisher,
    topic: &str,
    payload: &T,
) {
    match serde_json::to_value(payload) {
        Ok(value) => publisher.publish(topic, value).await,
        Err(err) => tracing::error!(topic, error = %err, "failed to encode event payload"),
    }
}

/// Process-local sink that fans out over a broadcast channel.
///
/// Published events are also kept in a history so tests and the dev server
/// can inspect what was emitted. `new` keeps everything; long-running
/// processes should use [`InMemoryPublisher::with_history_limit`], which
/// drops the oldest entries first.
#[derive(Clone)]
pub struct InMemoryPublisher {
    sender: broadcast::Sender<PublishedEvent>,
    history: Arc<RwLock<VecDeque<PublishedEvent>>>,
    history_limit: Option<usize>,
}

impl InMemoryPublisher {
    pub fn new() -> Self {
        Self::build(None)
    }

    pub fn with_history_limit(limit: usize) -> Self {
        Self::build(Some(limit))
    }

    fn build(history_limit: Option<usize>) -> Self {
        let (sender, _) = broadcast::channel(1024);
        Self {
            sender,
            history: Arc::new(RwLock::new(VecDeque::new())),
            history_limit,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    pub fn history(&self) -> Vec<PublishedEvent> {
        self.history
            .read()
            .map(|history| history.iter().cloned().collect::<Vec<_>>())
            .unwrap_or_default()
    }

    pub fn topics(&self) -> Vec<String> {
        self.history().into_iter().map(|e| e.topic).collect()
    }

    pub fn events_for(&self, topic: &str) -> Vec<serde_json::Value> {
        self.history()
            .into_iter()
            .filter(|e| e.topic == topic)
            .map(|e| e.payload)
            .collect()
    }
}

impl Default for InMemoryPublisher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryPublisher {
    async fn publish(&self, topic: &str, payload: serde_json::Value) {
        let event = PublishedEvent {
            topic: topic.to_string(),
            payload,
        };
        if let Ok(mut history) = self.history.write() {
            history.push_back(event.clone());
            if let Some(limit) = self.history_limit {
                while history.len() > limit {
                    history.pop_front();
                }
            }
        }
        // No receivers is not an error for a fire-and-forget sink.
        let _ = self.sender.send(event);
        tracing::debug!(topic, "event published");
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, _topic: &str, _payload: serde_json::Value) {}
}
