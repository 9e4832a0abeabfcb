//! Per-subject context state.

use super::subscriber::SubscriberId;
use crate::{ContextError, ContextResult};
use ctx_types::SubjectName;

/// A proposal that has not yet been committed or canceled.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingTransaction<T> {
    pub proposed: Option<T>,
    /// Subscribers polled so far, in poll order.
    pub polled: Vec<SubscriberId>,
    pub veto: Option<String>,
}

/// The current value of one subject plus at most one in-flight proposal.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextObject<T> {
    subject: SubjectName,
    value: Option<T>,
    pending: Option<PendingTransaction<T>>,
}

impl<T: Clone> ContextObject<T> {
    pub fn new(subject: SubjectName) -> Self {
        Self {
            subject,
            value: None,
            pending: None,
        }
    }

    pub fn subject(&self) -> &SubjectName {
        &self.subject
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&PendingTransaction<T>> {
        self.pending.as_ref()
    }

    /// Opens a transaction for `proposed`.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ConcurrentTransaction`] if a proposal is already pending.
    pub fn begin(&mut self, proposed: Option<T>) -> ContextResult<()> {
        if self.pending.is_some() {
            return Err(ContextError::ConcurrentTransaction {
                subject: self.subject.clone(),
            });
        }
        self.pending = Some(PendingTransaction {
            proposed,
            polled: Vec::new(),
            veto: None,
        });
        Ok(())
    }

    pub fn record_poll(&mut self, id: SubscriberId) {
        if let Some(pending) = self.pending.as_mut() {
            pending.polled.push(id);
        }
    }

    pub fn record_veto(&mut self, reason: impl Into<String>) {
        if let Some(pending) = self.pending.as_mut() {
            pending.veto.get_or_insert_with(|| reason.into());
        }
    }

    /// Moves the proposal into the current value. Returns false when nothing was pending.
    pub fn commit(&mut self) -> bool {
        match self.pending.take() {
            Some(pending) => {
                self.value = pending.proposed;
                true
            }
            None => false,
        }
    }

    /// Discards the proposal, returning it.
    pub fn cancel(&mut self) -> Option<PendingTransaction<T>> {
        self.pending.take()
    }
}
