//! In-process event delivery.
//!
//! Listeners register on an event name and receive that event and every event below it in the
//! dot hierarchy: a listener on `CONTEXT.CHANGED` sees `CONTEXT.CHANGED.Patient`.
//!
//! Each delivery says where the event came from. Events fired on this node are
//! [`Origin::Local`]; events received through the remote dispatcher carry the publishing node.

use crate::context::{ContextChanged, ContextManager, ContextPropagator};
use crate::payload::Payload;
use crate::{ContextError, SubscriberFault};
use ctx_broker::NodeId;
use ctx_types::EventName;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

/// Where a delivered event or committed change came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote { node: NodeId },
}

impl Origin {
    pub fn is_remote(&self) -> bool {
        matches!(self, Origin::Remote { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

pub trait EventListener: Send + Sync {
    fn name(&self) -> &str;

    fn on_event(
        &self,
        event: &EventName,
        payload: Option<&Payload>,
        origin: &Origin,
    ) -> Result<(), SubscriberFault>;
}

struct Registration {
    event: EventName,
    id: ListenerId,
    listener: Arc<dyn EventListener>,
}

/// Local event bus.
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<Vec<Registration>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            listeners: RwLock::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, event: EventName, listener: Arc<dyn EventListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        tracing::debug!("listener {} subscribed to {}", listener.name(), event);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Registration {
                event,
                id,
                listener,
            });
        id
    }

    /// Removes one registration. Returns false if it was not registered under `event`.
    pub fn unsubscribe(&self, event: &EventName, id: ListenerId) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|reg| !(reg.id == id && &reg.event == event));
        listeners.len() != before
    }

    /// Returns true if any listener would receive `event`.
    pub fn has_listeners(&self, event: &EventName) -> bool {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|reg| reg.event.matches(event))
    }

    /// Delivers `event` to every matching listener in registration order and returns how many
    /// were reached. Listener failures are logged and never propagate.
    pub fn deliver_locally(
        &self,
        event: &EventName,
        payload: Option<&Payload>,
        origin: &Origin,
    ) -> usize {
        let targets: Vec<Arc<dyn EventListener>> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|reg| reg.event.matches(event))
            .map(|reg| Arc::clone(&reg.listener))
            .collect();

        for listener in &targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                listener.on_event(event, payload, origin)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(fault)) => tracing::warn!("event {} listener fault: {}", event, fault),
                Err(_) => tracing::warn!("event {} listener {} panicked", event, listener.name()),
            }
        }
        targets.len()
    }
}

impl ContextPropagator for EventBus {
    fn propagate(&self, change: &ContextChanged) {
        let event = EventName::context_changed(&change.subject);
        self.deliver_locally(&event, change.value.as_ref(), &Origin::Local);
    }
}

/// Feeds context changes announced by other nodes into this node's [`ContextManager`].
///
/// Only remote deliveries are acted on; local `CONTEXT.CHANGED` notices are the manager's own
/// output.
pub struct RemoteContextBridge {
    manager: Weak<ContextManager>,
}

impl RemoteContextBridge {
    pub fn new(manager: &Arc<ContextManager>) -> Self {
        Self {
            manager: Arc::downgrade(manager),
        }
    }
}

impl EventListener for RemoteContextBridge {
    fn name(&self) -> &str {
        "remote-context-bridge"
    }

    fn on_event(
        &self,
        event: &EventName,
        payload: Option<&Payload>,
        origin: &Origin,
    ) -> Result<(), SubscriberFault> {
        let Origin::Remote { node } = origin else {
            return Ok(());
        };
        let Some(subject) = event.changed_subject() else {
            return Ok(());
        };
        let Some(manager) = self.manager.upgrade() else {
            return Ok(());
        };

        match manager.apply_remote_change(&subject, payload.cloned(), node.clone()) {
            Ok(()) => Ok(()),
            Err(ContextError::UnknownSubject(subject)) => {
                tracing::debug!("ignoring remote change for untracked subject {}", subject);
                Ok(())
            }
            Err(e) => Err(SubscriberFault::new(self.name(), e.to_string())),
        }
    }
}
