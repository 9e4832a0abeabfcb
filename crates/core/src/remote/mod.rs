//! Remote event propagation over a polling broker.

pub mod adapter;
pub mod dispatcher;

pub use adapter::{BrokerAdapter, EnvelopeInterceptor, InterceptorRegistry};
pub use dispatcher::{DispatcherStatus, PollReport, RemoteEventDispatcher};
