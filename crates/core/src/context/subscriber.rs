//! The three-phase subscriber contract and the per-subject registry.

use crate::payload::Payload;
use crate::SubscriberFault;
use ctx_types::SubjectName;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Identifies one registration, across every subject it was registered for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

/// A proposed or completed change, as seen by subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextChange {
    pub subject: SubjectName,
    pub proposed: Option<Payload>,
    pub previous: Option<Payload>,
}

/// A subscriber's answer to a pending change.
#[derive(Clone, Debug, PartialEq)]
pub enum PendingOutcome {
    Accepted,
    Refused(String),
    Faulted(SubscriberFault),
}

impl PendingOutcome {
    /// Builds a refusal; a blank reason is no objection.
    pub fn refuse(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if reason.trim().is_empty() {
            PendingOutcome::Accepted
        } else {
            PendingOutcome::Refused(reason)
        }
    }
}

/// A participant in two-phase context changes.
///
/// Callbacks run on the thread that requested the change, with no manager locks held. Changes
/// received from other nodes are applied on a blocking-pool thread, so callbacks may do blocking
/// I/O but must not wait on the async runtime.
pub trait ContextSubscriber: Send + Sync {
    /// Name used in logs and fault reports.
    fn name(&self) -> &str;

    /// Reviews a proposed change. `silent` is set for internal pre-checks, where the
    /// subscriber must not prompt a user.
    fn pending(&self, change: &ContextChange, silent: bool) -> PendingOutcome;

    fn committed(&self, change: &ContextChange) -> Result<(), SubscriberFault>;

    fn canceled(&self, change: &ContextChange) -> Result<(), SubscriberFault> {
        let _ = change;
        Ok(())
    }
}

/// A subscriber's objection collected during a survey.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Refusal {
    pub subscriber: String,
    pub reason: String,
}

/// One registration as seen in a snapshot.
#[derive(Clone)]
pub struct RegisteredSubscriber {
    pub id: SubscriberId,
    pub priority: i32,
    pub subscriber: Arc<dyn ContextSubscriber>,
}

impl fmt::Debug for RegisteredSubscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredSubscriber")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("name", &self.subscriber.name())
            .finish()
    }
}

/// Ordered subscriber lists keyed by subject.
///
/// Order is ascending priority, then registration order.
#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: u64,
    by_subject: HashMap<SubjectName, Vec<RegisteredSubscriber>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        subscriber: Arc<dyn ContextSubscriber>,
        priority: i32,
        subjects: &[SubjectName],
    ) -> SubscriberId {
        self.next_id += 1;
        let id = SubscriberId(self.next_id);
        for subject in subjects {
            let list = self.by_subject.entry(subject.clone()).or_default();
            if list.iter().any(|entry| entry.id == id) {
                continue;
            }
            // Ids grow with registration, so (priority, id) is the required order.
            let at = list
                .iter()
                .position(|entry| (entry.priority, entry.id) > (priority, id))
                .unwrap_or(list.len());
            list.insert(
                at,
                RegisteredSubscriber {
                    id,
                    priority,
                    subscriber: Arc::clone(&subscriber),
                },
            );
        }
        id
    }

    /// Removes the registration from every subject. Returns false if it was unknown.
    pub fn unregister(&mut self, id: SubscriberId) -> bool {
        let mut found = false;
        for list in self.by_subject.values_mut() {
            let before = list.len();
            list.retain(|entry| entry.id != id);
            found |= list.len() != before;
        }
        self.by_subject.retain(|_, list| !list.is_empty());
        found
    }

    pub fn snapshot(&self, subject: &SubjectName) -> Vec<RegisteredSubscriber> {
        self.by_subject.get(subject).cloned().unwrap_or_default()
    }

    pub fn len(&self, subject: &SubjectName) -> usize {
        self.by_subject.get(subject).map_or(0, Vec::len)
    }
}
