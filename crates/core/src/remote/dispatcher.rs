//! Remote event dispatcher: bridges the local event bus onto the broker.
//!
//! Outbound, events are encoded into envelopes and published on every topic their name maps
//! to. Inbound, a background task polls each subscribed topic for the window since the previous
//! pass and delivers what it finds to the local [`EventBus`] as remote events.
//!
//! # Polling window
//!
//! Each pass queries `[last_poll, now)` and then moves `last_poll` to `now` whether or not every
//! topic query succeeded. A topic whose query fails loses that window: delivery is at most once
//! per window, and messages published during a broker outage may be missed.
//!
//! # Lifecycle
//!
//! `Stopped -> start() -> Running -> terminate() -> Stopping -> (loop exits) -> Stopped`.
//! The loop sleeps for the poll interval or until woken, whichever comes first. Local
//! publications queued through [`RemoteEventDispatcher::queue_remote_event`] wake it and are
//! flushed in order before the next poll pass.

use super::adapter::BrokerAdapter;
use crate::config::DispatcherConfig;
use crate::context::{ContextChanged, ContextPropagator};
use crate::event_bus::{EventBus, Origin};
use crate::payload::{self, Payload};
use crate::{DispatchError, DispatchResult};
use chrono::{DateTime, Utc};
use ctx_broker::{BrokerClient, Clock, Envelope, NodeId, SubscriptionId};
use ctx_types::{EventName, Topic};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatcherStatus {
    Stopped,
    Running,
    Stopping,
}

/// Outcome of one poll pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Envelopes delivered to the local bus.
    pub delivered: usize,
    /// Envelopes addressed to other nodes.
    pub skipped: usize,
    /// Envelopes whose payload could not be decoded.
    pub dropped: usize,
    /// Topics whose query failed during this pass.
    pub failed_topics: Vec<Topic>,
}

struct PollState {
    subscriptions: BTreeMap<Topic, SubscriptionId>,
    last_poll: DateTime<Utc>,
}

struct OutboundEvent {
    event: EventName,
    payload: Option<Payload>,
    recipients: Vec<NodeId>,
}

struct Shared {
    adapter: BrokerAdapter,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    state: tokio::sync::Mutex<PollState>,
    extra_topics: RwLock<HashMap<EventName, Vec<Topic>>>,
    status: Mutex<DispatcherStatus>,
    stop: AtomicBool,
    wake_tx: mpsc::Sender<()>,
    wake_rx: tokio::sync::Mutex<mpsc::Receiver<()>>,
    outbox_tx: mpsc::UnboundedSender<OutboundEvent>,
    outbox_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<OutboundEvent>>,
}

pub struct RemoteEventDispatcher {
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteEventDispatcher {
    pub fn new(
        config: DispatcherConfig,
        client: Arc<dyn BrokerClient>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let adapter = BrokerAdapter::new(client, config.node_id);
        Self::with_adapter(adapter, bus, clock, config.poll_interval)
    }

    /// Builds a dispatcher around a preconfigured adapter; the node identity is the adapter's.
    pub fn with_adapter(
        adapter: BrokerAdapter,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let last_poll = clock.now();

        Self {
            shared: Arc::new(Shared {
                adapter,
                bus,
                clock,
                poll_interval,
                state: tokio::sync::Mutex::new(PollState {
                    subscriptions: BTreeMap::new(),
                    last_poll,
                }),
                extra_topics: RwLock::new(HashMap::new()),
                status: Mutex::new(DispatcherStatus::Stopped),
                stop: AtomicBool::new(false),
                wake_tx,
                wake_rx: tokio::sync::Mutex::new(wake_rx),
                outbox_tx,
                outbox_rx: tokio::sync::Mutex::new(outbox_rx),
            }),
            task: Mutex::new(None),
        }
    }

    pub fn node_id(&self) -> &NodeId {
        self.shared.adapter.node_id()
    }

    pub fn status(&self) -> DispatcherStatus {
        *self
            .shared
            .status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the poll loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoRuntime`] outside a tokio runtime
    /// - [`DispatchError::AlreadyRunning`] unless the dispatcher is stopped
    pub fn start(&self) -> DispatchResult<()> {
        let handle = Handle::try_current().map_err(|_| DispatchError::NoRuntime)?;
        {
            let mut status = self
                .shared
                .status
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *status != DispatcherStatus::Stopped {
                return Err(DispatchError::AlreadyRunning);
            }
            *status = DispatcherStatus::Running;
        }
        self.shared.stop.store(false, Ordering::SeqCst);

        let task = handle.spawn(run_loop(Arc::clone(&self.shared)));
        *self.task.lock().unwrap_or_else(PoisonError::into_inner) = Some(task);
        Ok(())
    }

    /// Asks the loop to stop and returns without waiting for it.
    pub fn terminate(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        {
            let mut status = self
                .shared
                .status
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *status == DispatcherStatus::Running {
                *status = DispatcherStatus::Stopping;
            }
        }
        self.wake();
    }

    /// Waits for a terminated loop to exit.
    pub async fn join(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                tracing::warn!("remote event dispatcher task ended abnormally: {}", e);
            }
        }
    }

    /// Cuts the current wait short. Never blocks; a wake already pending absorbs this one.
    pub fn wake(&self) {
        let _ = self.shared.wake_tx.try_send(());
    }

    /// Subscribes (`true`) or unsubscribes (`false`) the topic `event` maps to.
    ///
    /// Event names sharing a topic share one broker subscription. Subscribing an already
    /// subscribed topic, or unsubscribing one that is not subscribed, does not call the broker.
    pub async fn subscribe_remote_event(
        &self,
        event: &EventName,
        subscribe: bool,
    ) -> DispatchResult<()> {
        let topic = event.topic();
        let mut state = self.shared.state.lock().await;

        if subscribe {
            if state.subscriptions.contains_key(&topic) {
                return Ok(());
            }
            let id = self.shared.adapter.subscribe(&topic).await?;
            tracing::info!("subscribed to remote topic {} for {}", topic, event);
            state.subscriptions.insert(topic, id);
        } else {
            let Some(id) = state.subscriptions.get(&topic).copied() else {
                return Ok(());
            };
            self.shared.adapter.unsubscribe(&topic, &id).await?;
            tracing::info!("unsubscribed from remote topic {}", topic);
            state.subscriptions.remove(&topic);
        }
        Ok(())
    }

    /// Publishes `event` on every topic it maps to.
    ///
    /// An empty `recipients` list addresses every subscribed node.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Encode`] if the payload cannot be encoded and
    /// [`DispatchError::BrokerUnavailable`] if any publish fails.
    pub async fn fire_remote_event(
        &self,
        event: &EventName,
        payload: Option<&Payload>,
        recipients: &[NodeId],
    ) -> DispatchResult<()> {
        self.shared.publish(event, payload, recipients).await
    }

    /// Queues `event` for publication by the poll loop and wakes it.
    ///
    /// Queued events are published in the order they were queued; failures are logged.
    pub fn queue_remote_event(
        &self,
        event: EventName,
        payload: Option<Payload>,
        recipients: Vec<NodeId>,
    ) {
        let outbound = OutboundEvent {
            event,
            payload,
            recipients,
        };
        if let Err(e) = self.shared.outbox_tx.send(outbound) {
            tracing::warn!("dropping queued remote event {}: outbox closed", e.0.event);
            return;
        }
        self.wake();
    }

    /// Publishes every queued event now. Returns how many were taken from the queue.
    pub async fn flush_outbox(&self) -> usize {
        self.shared.flush_outbox().await
    }

    /// Also publishes `event` on `topic`, in addition to the topic derived from its name.
    pub fn extend_topics(&self, event: EventName, topic: Topic) {
        if event.topic() == topic {
            return;
        }
        let mut extra = self
            .shared
            .extra_topics
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let topics = extra.entry(event).or_default();
        if !topics.contains(&topic) {
            topics.push(topic);
        }
    }

    pub fn topics_for(&self, event: &EventName) -> Vec<Topic> {
        self.shared.topics_for(event)
    }

    /// Runs one poll pass immediately.
    pub async fn poll_once(&self) -> PollReport {
        self.shared.poll_pass().await
    }

    pub async fn last_poll_timestamp(&self) -> DateTime<Utc> {
        self.shared.state.lock().await.last_poll
    }

    pub async fn subscribed_topics(&self) -> Vec<Topic> {
        self.shared
            .state
            .lock()
            .await
            .subscriptions
            .keys()
            .cloned()
            .collect()
    }
}

impl Drop for RemoteEventDispatcher {
    fn drop(&mut self) {
        self.shared.stop.store(true, Ordering::SeqCst);
        let _ = self.shared.wake_tx.try_send(());
    }
}

impl ContextPropagator for RemoteEventDispatcher {
    fn propagate(&self, change: &ContextChanged) {
        if change.origin.is_remote() {
            return;
        }
        self.queue_remote_event(
            EventName::context_changed(&change.subject),
            change.value.clone(),
            Vec::new(),
        );
    }
}

impl Shared {
    fn topics_for(&self, event: &EventName) -> Vec<Topic> {
        let mut topics = vec![event.topic()];
        if let Some(extra) = self
            .extra_topics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
        {
            topics.extend(extra.iter().cloned());
        }
        topics
    }

    async fn publish(
        &self,
        event: &EventName,
        payload: Option<&Payload>,
        recipients: &[NodeId],
    ) -> DispatchResult<()> {
        let (encoding, body) = payload::encode(payload)?;
        let created = self.clock.now();
        for topic in self.topics_for(event) {
            let envelope = Envelope::new(
                topic.clone(),
                event.clone(),
                self.adapter.node_id().clone(),
                created,
            )
            .with_payload(encoding, body.clone())
            .with_recipients(recipients.to_vec());
            self.adapter.publish(&topic, envelope).await?;
        }
        Ok(())
    }

    async fn flush_outbox(&self) -> usize {
        let mut outbox = self.outbox_rx.lock().await;
        let mut flushed = 0;
        while let Ok(outbound) = outbox.try_recv() {
            flushed += 1;
            let result = self
                .publish(
                    &outbound.event,
                    outbound.payload.as_ref(),
                    &outbound.recipients,
                )
                .await;
            if let Err(e) = result {
                tracing::warn!("failed to publish remote event {}: {}", outbound.event, e);
            }
        }
        flushed
    }

    async fn poll_pass(&self) -> PollReport {
        let mut report = PollReport::default();
        let mut batches: Vec<(Topic, Vec<Envelope>)> = Vec::new();

        {
            let mut state = self.state.lock().await;
            let start = state.last_poll;
            let end = self.clock.now().max(start);

            for topic in state.subscriptions.keys() {
                match self.adapter.retrieve(topic, start, end).await {
                    Ok(envelopes) => batches.push((topic.clone(), envelopes)),
                    Err(e) => {
                        tracing::warn!("poll of remote topic {} failed: {}", topic, e);
                        report.failed_topics.push(topic.clone());
                    }
                }
            }
            state.last_poll = end;
        }

        let node_id = self.adapter.node_id();
        let mut deliveries = Vec::new();
        for (topic, envelopes) in batches {
            for envelope in envelopes {
                if !envelope.is_addressed_to(node_id) {
                    report.skipped += 1;
                    continue;
                }
                let payload = match payload::decode(envelope.payload_encoding, &envelope.payload)
                {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::warn!(
                            "dropping {} from {} on {}: {}",
                            envelope.subject,
                            envelope.origin_node,
                            topic,
                            e
                        );
                        report.dropped += 1;
                        continue;
                    }
                };
                let origin = Origin::Remote {
                    node: envelope.origin_node,
                };
                deliveries.push((envelope.subject, payload, origin));
            }
        }

        if deliveries.is_empty() {
            return report;
        }
        // Listeners run context transactions and may touch the filesystem.
        let count = deliveries.len();
        let bus = Arc::clone(&self.bus);
        let delivered = tokio::task::spawn_blocking(move || {
            for (event, payload, origin) in &deliveries {
                bus.deliver_locally(event, payload.as_ref(), origin);
            }
        })
        .await;
        match delivered {
            Ok(()) => report.delivered += count,
            Err(e) => tracing::warn!("local delivery of {} remote events failed: {}", count, e),
        }
        report
    }
}

async fn run_loop(shared: Arc<Shared>) {
    let mut wake_rx = shared.wake_rx.lock().await;
    tracing::info!(
        "remote event dispatcher started for node {} (poll every {:?})",
        shared.adapter.node_id(),
        shared.poll_interval
    );

    loop {
        tokio::select! {
            _ = wake_rx.recv() => {}
            _ = tokio::time::sleep(shared.poll_interval) => {}
        }
        if shared.stop.load(Ordering::SeqCst) {
            break;
        }

        shared.flush_outbox().await;
        let report = shared.poll_pass().await;
        if report.delivered > 0 || report.dropped > 0 {
            tracing::debug!(
                "poll pass delivered {} (skipped {}, dropped {})",
                report.delivered,
                report.skipped,
                report.dropped
            );
        }
    }

    shared.flush_outbox().await;
    drop(wake_rx);
    *shared.status.lock().unwrap_or_else(PoisonError::into_inner) = DispatcherStatus::Stopped;
    tracing::info!(
        "remote event dispatcher stopped for node {}",
        shared.adapter.node_id()
    );
}
