//! # Context Core
//!
//! Shared clinical context for one application node, and its propagation to other nodes.
//!
//! This crate contains:
//! - the [`ContextManager`], which runs two-phase (pending, then committed or canceled) changes
//!   of named subjects such as "Patient" across ordered subscribers
//! - the local [`EventBus`] and the [`RemoteContextBridge`] that feeds remote changes back in
//! - the [`RemoteEventDispatcher`], which publishes local events to a broker and polls it for
//!   events from other nodes
//! - a small [`PropertyStore`] used to remember selections between sessions
//!
//! Everything is constructed explicitly by the caller; there are no process-wide registries.
//! Startup configuration is resolved once into a [`NodeConfig`].

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod event_bus;
pub mod payload;
pub mod property;
pub mod remote;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{DispatcherConfig, NodeConfig};
pub use context::{
    ContextChange, ContextChanged, ContextManager, ContextPropagator, ContextSubscriber,
    PendingOutcome, Refusal, SubscriberId,
};
pub use error::{
    ConfigError, ConfigResult, ContextError, ContextResult, DispatchError, DispatchResult,
    PropertyError, PropertyResult, SubscriberFault,
};
pub use event_bus::{EventBus, EventListener, ListenerId, Origin, RemoteContextBridge};
pub use payload::Payload;
pub use property::{InMemoryPropertyStore, JsonFilePropertyStore, PropertyStore, SelectionMemory};
pub use remote::{
    BrokerAdapter, DispatcherStatus, EnvelopeInterceptor, InterceptorRegistry, PollReport,
    RemoteEventDispatcher,
};
