//! Remote event broker boundary.
//!
//! The broker itself is an external collaborator. This crate defines only what the context
//! workspace needs from it:
//! - the [`BrokerClient`] contract (subscribe, unsubscribe, retrieve by time window, publish)
//! - the [`Envelope`] message unit and its [`PayloadEncoding`] tag
//! - a [`Clock`] abstraction so publication windows can be driven deterministically
//! - [`InMemoryBroker`], a complete in-process broker for single-host deployments and tests
//!
//! Nothing here knows about context subjects or domain resources; payloads are opaque strings.

pub mod client;
pub mod clock;
pub mod envelope;
pub mod memory;

pub use client::{BrokerClient, RangeMode, SubscribeMode, SubscribeOptions};
pub use clock::{Clock, ManualClock, SystemClock};
pub use envelope::{Envelope, MessageId, NodeId, PayloadEncoding, SubscriptionId};
pub use memory::InMemoryBroker;

/// Errors returned by broker clients.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("broker rejected request: {0}")]
    Rejected(String),

    #[error("unknown subscription: {0}")]
    UnknownSubscription(SubscriptionId),

    #[error("invalid broker request: {0}")]
    InvalidRequest(String),
}

/// Type alias for Results that can fail with a [`BrokerError`].
pub type BrokerResult<T> = Result<T, BrokerError>;
