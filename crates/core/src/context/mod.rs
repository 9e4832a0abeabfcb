//! Shared context subjects and the two-phase change protocol.

pub mod manager;
pub mod object;
pub mod subscriber;

pub use manager::{ContextChanged, ContextManager, ContextPropagator};
pub use object::{ContextObject, PendingTransaction};
pub use subscriber::{
    ContextChange, ContextSubscriber, PendingOutcome, Refusal, RegisteredSubscriber, SubscriberId,
    SubscriberRegistry,
};
