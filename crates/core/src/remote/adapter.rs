//! Node-scoped wrapper over a [`BrokerClient`].
//!
//! The adapter fixes the node identity, subscribes in volatile mode, maps broker failures into
//! [`DispatchError`], and runs envelopes through the node's interceptors.

use crate::DispatchResult;
use chrono::{DateTime, Utc};
use ctx_broker::{
    BrokerClient, Envelope, MessageId, NodeId, RangeMode, SubscribeMode, SubscribeOptions,
    SubscriptionId,
};
use ctx_types::Topic;
use std::sync::Arc;

/// Hook applied to every envelope passing through a [`BrokerAdapter`].
pub trait EnvelopeInterceptor: Send + Sync {
    fn name(&self) -> &str;

    /// Decorates an envelope before it is published.
    fn outbound(&self, envelope: &mut Envelope) {
        let _ = envelope;
    }

    /// Returns false to drop a retrieved envelope before delivery.
    fn inbound(&self, envelope: &Envelope) -> bool {
        let _ = envelope;
        true
    }
}

/// Ordered interceptors owned by one adapter.
#[derive(Clone, Default)]
pub struct InterceptorRegistry {
    interceptors: Vec<Arc<dyn EnvelopeInterceptor>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, interceptor: Arc<dyn EnvelopeInterceptor>) {
        self.interceptors.push(interceptor);
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    fn apply_outbound(&self, envelope: &mut Envelope) {
        for interceptor in &self.interceptors {
            interceptor.outbound(envelope);
        }
    }

    fn admits(&self, envelope: &Envelope) -> bool {
        self.interceptors.iter().all(|interceptor| {
            let admitted = interceptor.inbound(envelope);
            if !admitted {
                tracing::debug!(
                    "interceptor {} dropped envelope {} from {}",
                    interceptor.name(),
                    envelope.subject,
                    envelope.origin_node
                );
            }
            admitted
        })
    }
}

pub struct BrokerAdapter {
    client: Arc<dyn BrokerClient>,
    node_id: NodeId,
    interceptors: InterceptorRegistry,
}

impl BrokerAdapter {
    pub fn new(client: Arc<dyn BrokerClient>, node_id: NodeId) -> Self {
        Self {
            client,
            node_id,
            interceptors: InterceptorRegistry::new(),
        }
    }

    pub fn with_interceptors(mut self, interceptors: InterceptorRegistry) -> Self {
        self.interceptors = interceptors;
        self
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub async fn subscribe(&self, topic: &Topic) -> DispatchResult<SubscriptionId> {
        let mut options = SubscribeOptions::new(self.node_id.clone());
        options.description = Some(format!("context events on {topic}"));
        let id = self
            .client
            .subscribe(
                std::slice::from_ref(topic),
                SubscribeMode::Volatile,
                &options,
                None,
            )
            .await?;
        tracing::debug!("broker subscribe {} -> {}", topic, id);
        Ok(id)
    }

    pub async fn unsubscribe(&self, topic: &Topic, id: &SubscriptionId) -> DispatchResult<()> {
        self.client
            .unsubscribe(std::slice::from_ref(topic), &self.node_id, id)
            .await?;
        tracing::debug!("broker unsubscribe {} ({})", topic, id);
        Ok(())
    }

    /// Retrieves envelopes published on `topic` in `[start, end)` by any other node.
    pub async fn retrieve(
        &self,
        topic: &Topic,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> DispatchResult<Vec<Envelope>> {
        let envelopes = self
            .client
            .retrieve_events(
                topic,
                RangeMode::PublicationTime,
                start,
                end,
                std::slice::from_ref(&self.node_id),
            )
            .await?;
        tracing::debug!(
            "broker retrieve {} [{}, {}): {} envelopes",
            topic,
            start,
            end,
            envelopes.len()
        );
        Ok(envelopes
            .into_iter()
            .filter(|envelope| self.interceptors.admits(envelope))
            .collect())
    }

    pub async fn publish(
        &self,
        topic: &Topic,
        mut envelope: Envelope,
    ) -> DispatchResult<MessageId> {
        self.interceptors.apply_outbound(&mut envelope);
        let id = self.client.publish(topic, envelope).await?;
        tracing::debug!("broker publish {} -> {}", topic, id);
        Ok(id)
    }
}
