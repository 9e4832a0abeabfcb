//! Test doubles shared by the unit tests in this crate.

use crate::context::{ContextChange, ContextSubscriber, PendingOutcome};
use crate::event_bus::{EventListener, Origin};
use crate::payload::Payload;
use crate::SubscriberFault;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ctx_broker::{
    BrokerClient, BrokerError, BrokerResult, Envelope, InMemoryBroker, MessageId, NodeId,
    RangeMode, SubscribeMode, SubscribeOptions, SubscriptionId,
};
use ctx_types::{EventName, Topic};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub(crate) type CallLog = Arc<Mutex<Vec<String>>>;

pub(crate) fn entries(log: &CallLog) -> Vec<String> {
    log.lock().expect("lock").clone()
}

type PendingHook = Box<dyn Fn(&ContextChange) + Send + Sync>;

/// A subscriber whose answers are fixed up front and whose calls are logged as
/// `name:phase[:silent]`.
pub(crate) struct ScriptedSubscriber {
    name: String,
    log: CallLog,
    refusal: Option<String>,
    refuse_only: Option<Payload>,
    panic_on_pending: bool,
    fault_on_commit: bool,
    panic_on_commit: bool,
    fault_on_cancel: bool,
    hook: Option<PendingHook>,
}

impl ScriptedSubscriber {
    pub(crate) fn new(name: &str, log: &CallLog) -> Self {
        Self {
            name: name.to_string(),
            log: Arc::clone(log),
            refusal: None,
            refuse_only: None,
            panic_on_pending: false,
            fault_on_commit: false,
            panic_on_commit: false,
            fault_on_cancel: false,
            hook: None,
        }
    }

    pub(crate) fn refusing(mut self, reason: &str) -> Self {
        self.refusal = Some(reason.to_string());
        self
    }

    /// Refuses only changes proposing `value`.
    pub(crate) fn refusing_value(mut self, value: &str, reason: &str) -> Self {
        self.refusal = Some(reason.to_string());
        self.refuse_only = Some(Payload::from(value));
        self
    }

    pub(crate) fn panicking(mut self) -> Self {
        self.panic_on_pending = true;
        self
    }

    pub(crate) fn faulting_on_commit(mut self) -> Self {
        self.fault_on_commit = true;
        self
    }

    pub(crate) fn panicking_on_commit(mut self) -> Self {
        self.panic_on_commit = true;
        self
    }

    pub(crate) fn faulting_on_cancel(mut self) -> Self {
        self.fault_on_cancel = true;
        self
    }

    /// Runs `hook` during the pending phase, before answering.
    pub(crate) fn on_pending(
        mut self,
        hook: impl Fn(&ContextChange) + Send + Sync + 'static,
    ) -> Self {
        self.hook = Some(Box::new(hook));
        self
    }

    pub(crate) fn build(self) -> Arc<Self> {
        Arc::new(self)
    }

    fn record(&self, entry: String) {
        self.log.lock().expect("lock").push(entry);
    }
}

impl ContextSubscriber for ScriptedSubscriber {
    fn name(&self) -> &str {
        &self.name
    }

    fn pending(&self, change: &ContextChange, silent: bool) -> PendingOutcome {
        self.record(format!("{}:pending:{}", self.name, silent));
        if let Some(hook) = &self.hook {
            hook(change);
        }
        if self.panic_on_pending {
            panic!("{} exploded", self.name);
        }
        let applies = self
            .refuse_only
            .as_ref()
            .is_none_or(|value| change.proposed.as_ref() == Some(value));
        match &self.refusal {
            Some(reason) if applies => PendingOutcome::Refused(reason.clone()),
            _ => PendingOutcome::Accepted,
        }
    }

    fn committed(&self, _change: &ContextChange) -> Result<(), SubscriberFault> {
        self.record(format!("{}:committed", self.name));
        if self.panic_on_commit {
            panic!("{} exploded after commit", self.name);
        }
        if self.fault_on_commit {
            return Err(SubscriberFault::new(&self.name, "commit handler failed"));
        }
        Ok(())
    }

    fn canceled(&self, _change: &ContextChange) -> Result<(), SubscriberFault> {
        self.record(format!("{}:canceled", self.name));
        if self.fault_on_cancel {
            return Err(SubscriberFault::new(&self.name, "cancel handler failed"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Delivery {
    pub event: EventName,
    pub payload: Option<Payload>,
    pub origin: Origin,
}

/// Records every event it receives and wakes waiters.
pub(crate) struct RecordingListener {
    deliveries: Mutex<Vec<Delivery>>,
    notify: Notify,
}

impl RecordingListener {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            deliveries: Mutex::new(Vec::new()),
            notify: Notify::new(),
        })
    }

    pub(crate) fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().expect("lock").clone()
    }

    /// Waits up to five seconds for at least `count` deliveries.
    pub(crate) async fn wait_for(&self, count: usize) -> Vec<Delivery> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let seen = self.deliveries();
            if seen.len() >= count {
                return seen;
            }
            let notified = self.notify.notified();
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                panic!("expected {count} deliveries, got {}", self.deliveries().len());
            }
        }
    }
}

impl EventListener for RecordingListener {
    fn name(&self) -> &str {
        "recording-listener"
    }

    fn on_event(
        &self,
        event: &EventName,
        payload: Option<&Payload>,
        origin: &Origin,
    ) -> Result<(), SubscriberFault> {
        self.deliveries.lock().expect("lock").push(Delivery {
            event: event.clone(),
            payload: payload.cloned(),
            origin: origin.clone(),
        });
        self.notify.notify_one();
        Ok(())
    }
}

/// An [`InMemoryBroker`] that counts calls and can be told to fail for chosen topics.
pub(crate) struct RecordingBroker {
    inner: InMemoryBroker,
    subscribes: AtomicUsize,
    unsubscribes: AtomicUsize,
    published: Mutex<Vec<Topic>>,
    failing: Mutex<HashSet<Topic>>,
    refuse_subscribes: AtomicBool,
}

impl RecordingBroker {
    pub(crate) fn new(inner: InMemoryBroker) -> Self {
        Self {
            inner,
            subscribes: AtomicUsize::new(0),
            unsubscribes: AtomicUsize::new(0),
            published: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            refuse_subscribes: AtomicBool::new(false),
        }
    }

    pub(crate) fn subscribe_calls(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn unsubscribe_calls(&self) -> usize {
        self.unsubscribes.load(Ordering::SeqCst)
    }

    pub(crate) fn published_topics(&self) -> Vec<Topic> {
        self.published.lock().expect("lock").clone()
    }

    pub(crate) fn fail_topic(&self, topic: Topic) {
        self.failing.lock().expect("lock").insert(topic);
    }

    pub(crate) fn refuse_subscribes(&self, refuse: bool) {
        self.refuse_subscribes.store(refuse, Ordering::SeqCst);
    }

    pub(crate) fn clear_failures(&self) {
        self.failing.lock().expect("lock").clear();
    }

    fn check(&self, topic: &Topic) -> BrokerResult<()> {
        if self.failing.lock().expect("lock").contains(topic) {
            return Err(BrokerError::Unreachable(format!("{topic} is down")));
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for RecordingBroker {
    async fn subscribe(
        &self,
        topics: &[Topic],
        mode: SubscribeMode,
        options: &SubscribeOptions,
        filter: Option<&str>,
    ) -> BrokerResult<SubscriptionId> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        if self.refuse_subscribes.load(Ordering::SeqCst) {
            return Err(BrokerError::Unreachable("subscribe refused".into()));
        }
        self.inner.subscribe(topics, mode, options, filter).await
    }

    async fn unsubscribe(
        &self,
        topics: &[Topic],
        node_id: &NodeId,
        subscription_id: &SubscriptionId,
    ) -> BrokerResult<()> {
        self.unsubscribes.fetch_add(1, Ordering::SeqCst);
        self.inner
            .unsubscribe(topics, node_id, subscription_id)
            .await
    }

    async fn retrieve_events(
        &self,
        topic: &Topic,
        range: RangeMode,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        exclude: &[NodeId],
    ) -> BrokerResult<Vec<Envelope>> {
        self.check(topic)?;
        self.inner
            .retrieve_events(topic, range, start, end, exclude)
            .await
    }

    async fn publish(&self, topic: &Topic, envelope: Envelope) -> BrokerResult<MessageId> {
        self.check(topic)?;
        self.published.lock().expect("lock").push(topic.clone());
        self.inner.publish(topic, envelope).await
    }
}
