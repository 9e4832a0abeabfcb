//! In-process broker.
//!
//! Keeps a bounded log of published envelopes per topic and a table of live subscriptions.
//! Several nodes sharing one `Arc<InMemoryBroker>` behave like workstation sessions attached to
//! the same remote broker.

use crate::{
    BrokerClient, BrokerError, BrokerResult, Clock, Envelope, MessageId, NodeId, RangeMode,
    SubscribeMode, SubscribeOptions, SubscriptionId, SystemClock,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ctx_types::Topic;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Messages retained per topic before the oldest are discarded.
pub const DEFAULT_TOPIC_RETENTION: usize = 1_000;

#[derive(Debug)]
struct Subscription {
    topics: Vec<Topic>,
    node_id: NodeId,
}

#[derive(Debug, Default)]
struct BrokerState {
    logs: HashMap<Topic, VecDeque<Envelope>>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
}

#[derive(Debug)]
pub struct InMemoryBroker {
    clock: Arc<dyn Clock>,
    retention: usize,
    state: Mutex<BrokerState>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Creates a broker that stamps publication times from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            retention: DEFAULT_TOPIC_RETENTION,
            state: Mutex::new(BrokerState::default()),
        }
    }

    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention.max(1);
        self
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.state()
            .subscriptions
            .values()
            .filter(|s| s.topics.contains(topic))
            .count()
    }

    /// Number of messages currently retained for `topic`.
    pub fn retained(&self, topic: &Topic) -> usize {
        self.state().logs.get(topic).map_or(0, VecDeque::len)
    }

    fn state(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn subscribe(
        &self,
        topics: &[Topic],
        mode: SubscribeMode,
        options: &SubscribeOptions,
        filter: Option<&str>,
    ) -> BrokerResult<SubscriptionId> {
        if topics.is_empty() {
            return Err(BrokerError::InvalidRequest(
                "subscribe requires at least one topic".into(),
            ));
        }

        // Nothing here outlives the process and every envelope is retained, so the mode and
        // filter only matter to real brokers.
        let id = SubscriptionId::new();
        self.state().subscriptions.insert(
            id,
            Subscription {
                topics: topics.to_vec(),
                node_id: options.node_id.clone(),
            },
        );
        tracing::debug!(
            "in-memory broker: {} subscribed to {:?} as {} ({:?}, filter {:?})",
            options.node_id,
            topics,
            id,
            mode,
            filter
        );
        Ok(id)
    }

    async fn unsubscribe(
        &self,
        topics: &[Topic],
        node_id: &NodeId,
        subscription_id: &SubscriptionId,
    ) -> BrokerResult<()> {
        let mut state = self.state();
        let owned = state
            .subscriptions
            .get(subscription_id)
            .is_some_and(|s| &s.node_id == node_id);
        if !owned {
            return Err(BrokerError::UnknownSubscription(*subscription_id));
        }

        let remove_all = match state.subscriptions.get_mut(subscription_id) {
            Some(sub) => {
                sub.topics.retain(|t| !topics.contains(t));
                topics.is_empty() || sub.topics.is_empty()
            }
            None => false,
        };
        if remove_all {
            state.subscriptions.remove(subscription_id);
        }
        Ok(())
    }

    async fn retrieve_events(
        &self,
        topic: &Topic,
        range: RangeMode,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: &[NodeId],
    ) -> BrokerResult<Vec<Envelope>> {
        match range {
            RangeMode::PublicationTime => {}
        }
        if end < start {
            return Err(BrokerError::InvalidRequest(format!(
                "retrieval window ends before it starts ({start} > {end})"
            )));
        }

        let state = self.state();
        let Some(log) = state.logs.get(topic) else {
            return Ok(Vec::new());
        };

        Ok(log
            .iter()
            .filter(|env| {
                env.publication_time
                    .is_some_and(|published| published >= start && published < end)
            })
            .filter(|env| !exclude.contains(&env.origin_node))
            .cloned()
            .collect())
    }

    async fn publish(&self, topic: &Topic, mut envelope: Envelope) -> BrokerResult<MessageId> {
        let id = MessageId::new();
        envelope.message_id = Some(id);
        envelope.publication_time = Some(self.clock.now());
        envelope.topic = topic.clone();

        let retention = self.retention;
        let mut state = self.state();
        let log = state.logs.entry(topic.clone()).or_default();
        log.push_back(envelope);
        while log.len() > retention {
            log.pop_front();
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ManualClock, PayloadEncoding};
    use chrono::Duration;
    use ctx_types::EventName;

    fn start_time() -> DateTime<Utc> {
        "2026-01-11T14:35:22Z".parse().expect("valid datetime")
    }

    fn topic() -> Topic {
        Topic::new("CONTEXT").expect("topic")
    }

    fn node(name: &str) -> NodeId {
        NodeId::new(name).expect("node")
    }

    fn envelope(origin: &str, body: &str) -> Envelope {
        Envelope::new(
            topic(),
            EventName::new("CONTEXT.CHANGED.Patient").expect("event"),
            node(origin),
            start_time(),
        )
        .with_payload(PayloadEncoding::None, body)
    }

    #[tokio::test]
    async fn retrieves_half_open_window_in_publish_order() {
        let clock = Arc::new(ManualClock::new(start_time()));
        let broker = InMemoryBroker::with_clock(clock.clone());

        broker.publish(&topic(), envelope("a", "first")).await.expect("publish");
        clock.advance(Duration::seconds(1));
        broker.publish(&topic(), envelope("a", "second")).await.expect("publish");
        clock.advance(Duration::seconds(1));
        broker.publish(&topic(), envelope("a", "third")).await.expect("publish");

        let window = broker
            .retrieve_events(
                &topic(),
                RangeMode::PublicationTime,
                start_time(),
                start_time() + Duration::seconds(2),
                &[],
            )
            .await
            .expect("retrieve");
        let bodies: Vec<_> = window.iter().map(|e| e.payload.as_str()).collect();
        assert_eq!(bodies, vec!["first", "second"]);
        assert!(window.iter().all(|e| e.message_id.is_some()));
    }

    #[tokio::test]
    async fn excludes_origin_nodes() {
        let broker = InMemoryBroker::with_clock(Arc::new(ManualClock::new(start_time())));
        broker.publish(&topic(), envelope("a", "mine")).await.expect("publish");
        broker.publish(&topic(), envelope("b", "theirs")).await.expect("publish");

        let window = broker
            .retrieve_events(
                &topic(),
                RangeMode::PublicationTime,
                start_time(),
                start_time() + Duration::seconds(1),
                &[node("a")],
            )
            .await
            .expect("retrieve");
        assert_eq!(window.len(), 1);
        assert_eq!(window[0].payload, "theirs");
    }

    #[tokio::test]
    async fn unsubscribe_requires_owning_node() {
        let broker = InMemoryBroker::new();
        let id = broker
            .subscribe(&[topic()], SubscribeMode::Volatile, &SubscribeOptions::new(node("a")), None)
            .await
            .expect("subscribe");
        assert_eq!(broker.subscriber_count(&topic()), 1);

        let err = broker
            .unsubscribe(&[topic()], &node("b"), &id)
            .await
            .expect_err("foreign node cannot unsubscribe");
        assert_eq!(err, BrokerError::UnknownSubscription(id));

        broker.unsubscribe(&[topic()], &node("a"), &id).await.expect("unsubscribe");
        assert_eq!(broker.subscriber_count(&topic()), 0);
    }

    #[tokio::test]
    async fn retention_discards_oldest() {
        let broker = InMemoryBroker::new().with_retention(2);
        for body in ["1", "2", "3"] {
            broker.publish(&topic(), envelope("a", body)).await.expect("publish");
        }
        assert_eq!(broker.retained(&topic()), 2);
    }

    #[tokio::test]
    async fn subscribe_without_topics_is_rejected() {
        let broker = InMemoryBroker::new();
        let err = broker
            .subscribe(&[], SubscribeMode::Durable, &SubscribeOptions::new(node("a")), None)
            .await
            .expect_err("empty topic list");
        assert!(matches!(err, BrokerError::InvalidRequest(_)));
    }
}
