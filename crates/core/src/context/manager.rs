//! Two-phase context changes across the registered subscribers.
//!
//! A change runs as:
//!
//! 1. open a transaction on the subject (fails if one is already pending)
//! 2. snapshot the subject's subscribers
//! 3. poll each subscriber's pending phase in order; the first refusal (or fault) cancels the
//!    transaction and every subscriber polled so far is told it was canceled
//! 4. otherwise commit, notify every subscriber, then hand the change to the propagators
//!
//! No lock is held while a callback runs, so callbacks may query or change other subjects,
//! register and unregister subscribers, or even request another change on the same subject
//! (which fails with [`ContextError::ConcurrentTransaction`]).
//!
//! A remote change that arrives while its subject is pending is parked and retried once the
//! pending transaction ends. If that transaction was a local commit, the local value is already
//! on its way to every other node and the parked change is dropped as superseded.

use super::object::ContextObject;
use super::subscriber::{
    ContextChange, ContextSubscriber, PendingOutcome, Refusal, RegisteredSubscriber,
    SubscriberId, SubscriberRegistry,
};
use crate::event_bus::Origin;
use crate::payload::Payload;
use crate::{ContextError, ContextResult, SubscriberFault};
use ctx_broker::NodeId;
use ctx_types::SubjectName;
use std::any::Any;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

/// A committed change handed to propagators.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextChanged {
    pub subject: SubjectName,
    pub value: Option<Payload>,
    pub origin: Origin,
}

/// Receives every committed change, after subscribers have been notified.
///
/// Propagation is fire-and-forget: implementations must not block the requesting thread on
/// remote work.
pub trait ContextPropagator: Send + Sync {
    fn propagate(&self, change: &ContextChanged);
}

/// A remote change waiting for its subject's pending transaction to end.
struct DeferredRemote {
    value: Option<Payload>,
    node: NodeId,
}

/// Owns the shared context for a set of subjects.
pub struct ContextManager {
    contexts: Mutex<HashMap<SubjectName, ContextObject<Payload>>>,
    subscribers: RwLock<SubscriberRegistry>,
    propagators: RwLock<Vec<Arc<dyn ContextPropagator>>>,
    deferred: Mutex<HashMap<SubjectName, DeferredRemote>>,
}

impl ContextManager {
    pub fn new<I>(subjects: I) -> Self
    where
        I: IntoIterator<Item = SubjectName>,
    {
        let contexts = subjects
            .into_iter()
            .map(|subject| (subject.clone(), ContextObject::new(subject)))
            .collect();
        Self {
            contexts: Mutex::new(contexts),
            subscribers: RwLock::new(SubscriberRegistry::new()),
            propagators: RwLock::new(Vec::new()),
            deferred: Mutex::new(HashMap::new()),
        }
    }

    /// Adds a subject. Returns false if it already existed.
    pub fn add_subject(&self, subject: SubjectName) -> bool {
        let mut contexts = self.lock_contexts();
        if contexts.contains_key(&subject) {
            return false;
        }
        contexts.insert(subject.clone(), ContextObject::new(subject));
        true
    }

    pub fn subjects(&self) -> Vec<SubjectName> {
        let mut subjects: Vec<_> = self.lock_contexts().keys().cloned().collect();
        subjects.sort();
        subjects
    }

    /// Current value of `subject`; `None` when unset or unknown.
    pub fn get_current(&self, subject: &SubjectName) -> Option<Payload> {
        self.lock_contexts()
            .get(subject)
            .and_then(|obj| obj.value().cloned())
    }

    pub fn is_pending(&self, subject: &SubjectName) -> bool {
        self.lock_contexts()
            .get(subject)
            .is_some_and(ContextObject::is_pending)
    }

    pub fn register_subscriber(
        &self,
        subscriber: Arc<dyn ContextSubscriber>,
        priority: i32,
        subjects: &[SubjectName],
    ) -> SubscriberId {
        let id = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(Arc::clone(&subscriber), priority, subjects);
        tracing::debug!(
            "registered context subscriber {} as {} (priority {})",
            subscriber.name(),
            id,
            priority
        );
        id
    }

    pub fn unregister_subscriber(&self, id: SubscriberId) -> bool {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister(id)
    }

    pub fn add_propagator(&self, propagator: Arc<dyn ContextPropagator>) {
        self.propagators
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(propagator);
    }

    /// Requests a local change of `subject` to `value`.
    ///
    /// # Errors
    ///
    /// - [`ContextError::UnknownSubject`] if the subject was never added
    /// - [`ContextError::ConcurrentTransaction`] if a change is already pending
    /// - [`ContextError::ChangeRefused`] if a subscriber refused or faulted
    pub fn request_change(
        &self,
        subject: &SubjectName,
        value: Option<Payload>,
    ) -> ContextResult<()> {
        self.run_transaction(subject, value, false, Origin::Local)
    }

    /// Applies a change announced by another node.
    ///
    /// Subscribers are polled silently and the resulting notice carries the remote origin, so
    /// propagators that forward to remote nodes can skip it.
    ///
    /// If the subject is pending, the change is parked instead of failing: it is applied when the
    /// pending transaction is canceled or was itself remote, and dropped when a local commit
    /// supersedes it. Only the latest parked change per subject is kept.
    pub fn apply_remote_change(
        &self,
        subject: &SubjectName,
        value: Option<Payload>,
        node: NodeId,
    ) -> ContextResult<()> {
        let origin = Origin::Remote { node: node.clone() };
        match self.run_transaction(subject, value.clone(), true, origin) {
            Err(ContextError::ConcurrentTransaction { .. }) => {
                tracing::info!(
                    "deferring remote change for {} from {} until the pending change ends",
                    subject,
                    node
                );
                self.lock_deferred()
                    .insert(subject.clone(), DeferredRemote { value, node });
                // The pending transaction may have ended before the change was parked.
                if !self.is_pending(subject) {
                    self.resume_deferred(subject, false);
                }
                Ok(())
            }
            other => other,
        }
    }

    /// Polls every subscriber silently and reports all objections without committing.
    ///
    /// # Errors
    ///
    /// Same subject errors as [`ContextManager::request_change`]; refusals are returned, not
    /// raised.
    pub fn survey_change(
        &self,
        subject: &SubjectName,
        value: Option<Payload>,
    ) -> ContextResult<Vec<Refusal>> {
        let change = self.begin(subject, value)?;
        let snapshot = self.snapshot(subject);

        let mut refusals = Vec::new();
        for entry in &snapshot {
            self.with_object(subject, |obj| obj.record_poll(entry.id));
            if let Some(reason) = veto_reason(entry, poll(entry, &change, true)) {
                refusals.push(Refusal {
                    subscriber: entry.subscriber.name().to_string(),
                    reason,
                });
            }
        }

        self.with_object(subject, |obj| {
            obj.cancel();
        });
        notify_canceled(&snapshot, &change);
        self.resume_deferred(subject, false);
        Ok(refusals)
    }

    fn run_transaction(
        &self,
        subject: &SubjectName,
        value: Option<Payload>,
        silent: bool,
        origin: Origin,
    ) -> ContextResult<()> {
        let change = self.begin(subject, value)?;
        let snapshot = self.snapshot(subject);

        for (index, entry) in snapshot.iter().enumerate() {
            self.with_object(subject, |obj| obj.record_poll(entry.id));
            let Some(reason) = veto_reason(entry, poll(entry, &change, silent)) else {
                continue;
            };

            self.with_object(subject, |obj| {
                obj.record_veto(reason.clone());
                obj.cancel();
            });
            notify_canceled(&snapshot[..=index], &change);
            tracing::info!(
                "context change for {} refused by {}: {}",
                subject,
                entry.subscriber.name(),
                reason
            );
            self.resume_deferred(subject, false);
            return Err(ContextError::ChangeRefused {
                subject: subject.clone(),
                reason,
            });
        }

        self.with_object(subject, |obj| {
            obj.commit();
        });
        tracing::debug!(
            "context change for {} committed ({} subscribers)",
            subject,
            snapshot.len()
        );

        for entry in &snapshot {
            let name = entry.subscriber.name();
            match guarded(name, || entry.subscriber.committed(&change)) {
                Ok(()) => {}
                Err(fault) => tracing::warn!("ignoring fault after commit: {}", fault),
            }
        }

        let superseding = !origin.is_remote();
        let notice = ContextChanged {
            subject: subject.clone(),
            value: change.proposed,
            origin,
        };
        let propagators = self
            .propagators
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for propagator in propagators {
            if catch_unwind(AssertUnwindSafe(|| propagator.propagate(&notice))).is_err() {
                tracing::warn!("context propagator panicked for {}", subject);
            }
        }

        self.resume_deferred(subject, superseding);
        Ok(())
    }

    /// Applies or drops the change parked for `subject`, if any.
    fn resume_deferred(&self, subject: &SubjectName, superseded: bool) {
        let Some(deferred) = self.lock_deferred().remove(subject) else {
            return;
        };
        if superseded {
            tracing::info!(
                "remote change for {} from {} superseded by a local commit",
                subject,
                deferred.node
            );
            return;
        }
        if let Err(e) = self.apply_remote_change(subject, deferred.value, deferred.node) {
            tracing::warn!("deferred remote change for {} not applied: {}", subject, e);
        }
    }

    fn begin(
        &self,
        subject: &SubjectName,
        value: Option<Payload>,
    ) -> ContextResult<ContextChange> {
        let mut contexts = self.lock_contexts();
        let obj = contexts
            .get_mut(subject)
            .ok_or_else(|| ContextError::UnknownSubject(subject.clone()))?;
        let previous = obj.value().cloned();
        obj.begin(value.clone())?;
        Ok(ContextChange {
            subject: subject.clone(),
            proposed: value,
            previous,
        })
    }

    fn snapshot(&self, subject: &SubjectName) -> Vec<RegisteredSubscriber> {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot(subject)
    }

    fn with_object(&self, subject: &SubjectName, f: impl FnOnce(&mut ContextObject<Payload>)) {
        if let Some(obj) = self.lock_contexts().get_mut(subject) {
            f(obj);
        }
    }

    fn lock_contexts(&self) -> MutexGuard<'_, HashMap<SubjectName, ContextObject<Payload>>> {
        self.contexts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_deferred(&self) -> MutexGuard<'_, HashMap<SubjectName, DeferredRemote>> {
        self.deferred.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn poll(entry: &RegisteredSubscriber, change: &ContextChange, silent: bool) -> PendingOutcome {
    let name = entry.subscriber.name();
    match catch_unwind(AssertUnwindSafe(|| entry.subscriber.pending(change, silent))) {
        Ok(outcome) => outcome,
        Err(panic) => PendingOutcome::Faulted(SubscriberFault::new(name, panic_message(&*panic))),
    }
}

/// Maps an outcome to the reason it blocks the change, if any.
fn veto_reason(entry: &RegisteredSubscriber, outcome: PendingOutcome) -> Option<String> {
    match outcome {
        PendingOutcome::Accepted => None,
        PendingOutcome::Refused(reason) if reason.trim().is_empty() => None,
        PendingOutcome::Refused(reason) => Some(reason),
        PendingOutcome::Faulted(fault) => {
            tracing::warn!("subscriber fault during pending phase: {}", fault);
            Some(format!("subscriber {} failed", entry.subscriber.name()))
        }
    }
}

fn notify_canceled(entries: &[RegisteredSubscriber], change: &ContextChange) {
    for entry in entries {
        let name = entry.subscriber.name();
        if let Err(fault) = guarded(name, || entry.subscriber.canceled(change)) {
            tracing::warn!("ignoring fault after cancel: {}", fault);
        }
    }
}

/// Runs a notification, turning a panic into a fault.
fn guarded(
    name: &str,
    f: impl FnOnce() -> Result<(), SubscriberFault>,
) -> Result<(), SubscriberFault> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|panic| Err(SubscriberFault::new(name, panic_message(&*panic))))
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(text) = panic.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = panic.downcast_ref::<String>() {
        text.clone()
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entries, CallLog, ScriptedSubscriber};
    use std::sync::Weak;

    fn patient() -> SubjectName {
        SubjectName::new("Patient").expect("subject")
    }

    fn location() -> SubjectName {
        SubjectName::new("Location").expect("subject")
    }

    fn manager() -> Arc<ContextManager> {
        Arc::new(ContextManager::new([patient(), location()]))
    }

    #[derive(Default)]
    struct RecordingPropagator {
        seen: Mutex<Vec<ContextChanged>>,
    }

    impl ContextPropagator for RecordingPropagator {
        fn propagate(&self, change: &ContextChanged) {
            self.seen.lock().expect("lock").push(change.clone());
        }
    }

    #[test]
    fn commits_when_everyone_accepts() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(ScriptedSubscriber::new("banner", &log).build(), 0, &[patient()]);
        mgr.register_subscriber(ScriptedSubscriber::new("chart", &log).build(), 5, &[patient()]);

        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("committed");

        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-1")));
        assert!(!mgr.is_pending(&patient()));
        assert_eq!(
            entries(&log),
            vec![
                "banner:pending:false",
                "chart:pending:false",
                "banner:committed",
                "chart:committed",
            ]
        );
    }

    #[test]
    fn refusal_cancels_everyone_polled_and_keeps_value() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("initial");

        mgr.register_subscriber(ScriptedSubscriber::new("banner", &log).build(), 0, &[patient()]);
        mgr.register_subscriber(
            ScriptedSubscriber::new("notes", &log).refusing("unsaved note").build(),
            1,
            &[patient()],
        );
        mgr.register_subscriber(ScriptedSubscriber::new("orders", &log).build(), 2, &[patient()]);

        let err = mgr
            .request_change(&patient(), Some(Payload::from("p-2")))
            .expect_err("refused");
        assert_eq!(
            err,
            ContextError::ChangeRefused {
                subject: patient(),
                reason: "unsaved note".into()
            }
        );
        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-1")));
        assert_eq!(
            entries(&log),
            vec![
                "banner:pending:false",
                "notes:pending:false",
                "banner:canceled",
                "notes:canceled",
            ]
        );
    }

    #[test]
    fn blank_refusal_does_not_block() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(
            ScriptedSubscriber::new("banner", &log).refusing("   ").build(),
            0,
            &[patient()],
        );
        mgr.request_change(&patient(), None).expect("committed");
        assert_eq!(entries(&log), vec!["banner:pending:false", "banner:committed"]);
    }

    #[test]
    fn panicking_subscriber_is_a_refusal() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(
            ScriptedSubscriber::new("flaky", &log).panicking().build(),
            0,
            &[patient()],
        );
        let err = mgr
            .request_change(&patient(), Some(Payload::from("p-1")))
            .expect_err("faulted");
        assert!(
            matches!(err, ContextError::ChangeRefused { reason, .. } if reason.contains("flaky"))
        );
        assert_eq!(mgr.get_current(&patient()), None);
        assert!(!mgr.is_pending(&patient()));
    }

    #[test]
    fn commit_faults_do_not_stop_other_notifications() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(
            ScriptedSubscriber::new("banner", &log).faulting_on_commit().build(),
            0,
            &[patient()],
        );
        mgr.register_subscriber(ScriptedSubscriber::new("chart", &log).build(), 1, &[patient()]);
        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("committed");
        assert!(entries(&log).contains(&"chart:committed".to_string()));
    }

    #[test]
    fn commit_panics_are_contained() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(
            ScriptedSubscriber::new("banner", &log).panicking_on_commit().build(),
            0,
            &[patient()],
        );
        mgr.register_subscriber(ScriptedSubscriber::new("chart", &log).build(), 1, &[patient()]);
        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("committed");
        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-1")));
        assert!(entries(&log).contains(&"chart:committed".to_string()));
    }

    #[test]
    fn cancel_faults_are_skipped() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(
            ScriptedSubscriber::new("banner", &log).faulting_on_cancel().build(),
            0,
            &[patient()],
        );
        mgr.register_subscriber(
            ScriptedSubscriber::new("notes", &log).refusing("unsaved note").build(),
            1,
            &[patient()],
        );

        let err = mgr
            .request_change(&patient(), Some(Payload::from("p-1")))
            .expect_err("refused");
        assert!(matches!(err, ContextError::ChangeRefused { .. }));
        assert!(!mgr.is_pending(&patient()));
        assert_eq!(
            entries(&log),
            vec![
                "banner:pending:false",
                "notes:pending:false",
                "banner:canceled",
                "notes:canceled",
            ]
        );
        mgr.register_subscriber(ScriptedSubscriber::new("chart", &log).build(), 2, &[patient()]);
        assert_eq!(mgr.survey_change(&patient(), None).expect("survey").len(), 1);
    }

    /// Registers a subscriber that delivers `remote` from another node while `patient()` is
    /// pending, the first time it is polled.
    fn remote_arrives_while_pending(mgr: &Arc<ContextManager>, log: &CallLog, remote: &str) {
        let weak = Arc::downgrade(mgr);
        let remote = Payload::from(remote);
        let fired = Arc::new(Mutex::new(false));
        let subscriber = ScriptedSubscriber::new("banner", log)
            .on_pending(move |_| {
                let mut fired = fired.lock().expect("lock");
                if *fired {
                    return;
                }
                *fired = true;
                if let Some(mgr) = weak.upgrade() {
                    let node = NodeId::new("ward-2").expect("node");
                    mgr.apply_remote_change(&patient(), Some(remote.clone()), node)
                        .expect("parked");
                }
            })
            .build();
        mgr.register_subscriber(subscriber, 0, &[patient()]);
    }

    #[test]
    fn remote_change_during_refused_local_change_is_applied_afterwards() {
        let mgr = manager();
        let log = CallLog::default();
        let propagator = Arc::new(RecordingPropagator::default());
        mgr.add_propagator(propagator.clone());
        remote_arrives_while_pending(&mgr, &log, "p-remote");
        mgr.register_subscriber(
            ScriptedSubscriber::new("notes", &log)
                .refusing_value("p-local", "unsaved note")
                .build(),
            1,
            &[patient()],
        );

        let err = mgr
            .request_change(&patient(), Some(Payload::from("p-local")))
            .expect_err("refused");
        assert!(matches!(err, ContextError::ChangeRefused { .. }));

        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-remote")));
        assert!(!mgr.is_pending(&patient()));
        let seen = propagator.seen.lock().expect("lock");
        assert_eq!(seen.len(), 1);
        assert!(seen[0].origin.is_remote());
    }

    #[test]
    fn local_commit_supersedes_remote_change_that_arrived_while_pending() {
        let mgr = manager();
        let log = CallLog::default();
        let propagator = Arc::new(RecordingPropagator::default());
        mgr.add_propagator(propagator.clone());
        remote_arrives_while_pending(&mgr, &log, "p-remote");

        mgr.request_change(&patient(), Some(Payload::from("p-local")))
            .expect("committed");

        // The local value is what every other node receives, so this node keeps it too.
        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-local")));
        {
            let seen = propagator.seen.lock().expect("lock");
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].origin, Origin::Local);
        }

        // Nothing stays parked for the next transaction.
        mgr.request_change(&patient(), Some(Payload::from("p-next")))
            .expect("committed");
        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-next")));
        assert_eq!(propagator.seen.lock().expect("lock").len(), 2);
    }

    #[test]
    fn unregistering_mid_transaction_leaves_snapshot_intact() {
        let mgr = manager();
        let log = CallLog::default();
        let weak: Weak<ContextManager> = Arc::downgrade(&mgr);
        let victim = Arc::new(Mutex::new(None::<SubscriberId>));

        let hook_victim = Arc::clone(&victim);
        let first = ScriptedSubscriber::new("banner", &log)
            .on_pending(move |_| {
                let id = hook_victim.lock().expect("lock").take();
                if let (Some(mgr), Some(id)) = (weak.upgrade(), id) {
                    mgr.unregister_subscriber(id);
                }
            })
            .build();
        mgr.register_subscriber(first, 0, &[patient()]);
        let id = mgr.register_subscriber(
            ScriptedSubscriber::new("chart", &log).build(),
            1,
            &[patient(), location()],
        );
        *victim.lock().expect("lock") = Some(id);

        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("committed");
        assert!(entries(&log).contains(&"chart:committed".to_string()));

        log.lock().expect("lock").clear();
        mgr.request_change(&location(), Some(Payload::from("ward-7")))
            .expect("committed");
        assert!(entries(&log).is_empty());
    }

    #[test]
    fn reentrant_request_on_same_subject_is_rejected() {
        let mgr = manager();
        let log = CallLog::default();
        let weak = Arc::downgrade(&mgr);
        let nested = Arc::new(Mutex::new(None::<ContextResult<()>>));

        let nested_result = Arc::clone(&nested);
        let subscriber = ScriptedSubscriber::new("banner", &log)
            .on_pending(move |_| {
                if let Some(mgr) = weak.upgrade() {
                    let result = mgr.request_change(&patient(), Some(Payload::from("p-2")));
                    *nested_result.lock().expect("lock") = Some(result);
                }
            })
            .build();
        mgr.register_subscriber(subscriber, 0, &[patient()]);

        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("outer committed");

        let nested = nested.lock().expect("lock").take().expect("nested attempt");
        assert!(matches!(
            nested,
            Err(ContextError::ConcurrentTransaction { .. })
        ));
        assert_eq!(mgr.get_current(&patient()), Some(Payload::from("p-1")));
    }

    #[test]
    fn survey_reports_all_refusals_without_committing() {
        let mgr = manager();
        let log = CallLog::default();
        mgr.register_subscriber(
            ScriptedSubscriber::new("notes", &log).refusing("unsaved note").build(),
            0,
            &[patient()],
        );
        mgr.register_subscriber(
            ScriptedSubscriber::new("orders", &log).refusing("unsigned order").build(),
            1,
            &[patient()],
        );

        let refusals = mgr
            .survey_change(&patient(), Some(Payload::from("p-1")))
            .expect("survey");
        let reasons: Vec<_> = refusals.iter().map(|r| r.reason.as_str()).collect();
        assert_eq!(reasons, vec!["unsaved note", "unsigned order"]);
        assert_eq!(mgr.get_current(&patient()), None);
        assert!(!mgr.is_pending(&patient()));
        assert!(entries(&log).contains(&"orders:pending:true".to_string()));
        assert!(entries(&log).contains(&"orders:canceled".to_string()));
    }

    #[test]
    fn propagators_receive_committed_changes_with_origin() {
        let mgr = manager();
        let propagator = Arc::new(RecordingPropagator::default());
        mgr.add_propagator(propagator.clone());

        mgr.request_change(&patient(), Some(Payload::from("p-1")))
            .expect("local");
        let node = NodeId::new("ward-2").expect("node");
        mgr.apply_remote_change(&location(), None, node.clone())
            .expect("remote");

        let seen = propagator.seen.lock().expect("lock");
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].origin, Origin::Local);
        assert_eq!(seen[1].origin, Origin::Remote { node });
    }

    #[test]
    fn unknown_subject_is_rejected() {
        let mgr = manager();
        let err = mgr
            .request_change(&SubjectName::new("Encounter").expect("subject"), None)
            .expect_err("unknown");
        assert!(matches!(err, ContextError::UnknownSubject(_)));
        assert!(mgr.add_subject(SubjectName::new("Encounter").expect("subject")));
        assert!(!mgr.add_subject(patient()));
    }
}
