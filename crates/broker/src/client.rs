//! Broker client contract.

use crate::{BrokerResult, Envelope, MessageId, NodeId, SubscriptionId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ctx_types::Topic;

/// Lifetime of a broker subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SubscribeMode {
    /// Survives broker restarts.
    Durable,
    /// Dropped when the broker restarts.
    #[default]
    Volatile,
}

/// How the `start`/`end` bounds of a retrieval are interpreted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RangeMode {
    /// Half-open window `[start, end)` over broker publication time.
    #[default]
    PublicationTime,
}

/// Options attached to a subscription request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscribeOptions {
    /// Node that owns the subscription.
    pub node_id: NodeId,
    /// Free-form label shown in broker tooling.
    pub description: Option<String>,
}

impl SubscribeOptions {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            description: None,
        }
    }
}

/// Remote pub/sub broker as seen by one node.
///
/// Implementations are expected to be cheap to share (`Arc<dyn BrokerClient>`) and safe to call
/// from several tasks at once.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Subscribes to `topics` and returns the broker-assigned handle.
    ///
    /// `filter` is an optional selector passed through to the broker untouched.
    async fn subscribe(
        &self,
        topics: &[Topic],
        mode: SubscribeMode,
        options: &SubscribeOptions,
        filter: Option<&str>,
    ) -> BrokerResult<SubscriptionId>;

    /// Releases a subscription previously returned by [`BrokerClient::subscribe`].
    async fn unsubscribe(
        &self,
        topics: &[Topic],
        node_id: &NodeId,
        subscription_id: &SubscriptionId,
    ) -> BrokerResult<()>;

    /// Returns the messages published on `topic` within the window, oldest first, skipping
    /// messages that originated from any node in `exclude`.
    async fn retrieve_events(
        &self,
        topic: &Topic,
        range: RangeMode,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: &[NodeId],
    ) -> BrokerResult<Vec<Envelope>>;

    /// Publishes an envelope and returns its message id.
    async fn publish(&self, topic: &Topic, envelope: Envelope) -> BrokerResult<MessageId>;
}
