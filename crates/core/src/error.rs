use ctx_broker::BrokerError;
use ctx_types::SubjectName;

/// Errors surfaced by context transactions.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("a context change is already pending for {subject}; retry later")]
    ConcurrentTransaction { subject: SubjectName },

    #[error("context change for {subject} refused: {reason}")]
    ChangeRefused { subject: SubjectName, reason: String },

    #[error("unknown context subject: {0}")]
    UnknownSubject(SubjectName),
}

pub type ContextResult<T> = std::result::Result<T, ContextError>;

/// A subscriber implementation failed while being notified.
///
/// Never fatal: during the pending phase it counts as a refusal, afterwards it is only logged.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("subscriber {subscriber} failed: {message}")]
pub struct SubscriberFault {
    pub subscriber: String,
    pub message: String,
}

impl SubscriberFault {
    pub fn new(subscriber: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subscriber: subscriber.into(),
            message: message.into(),
        }
    }
}

/// Errors from the remote event path.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("broker unavailable: {0}")]
    BrokerUnavailable(#[from] BrokerError),

    #[error("failed to decode remote payload: {0}")]
    Decode(String),

    #[error("failed to encode payload: {0}")]
    Encode(String),

    #[error("remote event dispatcher is already running")]
    AlreadyRunning,

    #[error("remote event dispatcher requires a tokio runtime")]
    NoRuntime,
}

pub type DispatchResult<T> = std::result::Result<T, DispatchError>;

/// Errors from the property store.
#[derive(Debug, thiserror::Error)]
pub enum PropertyError {
    #[error("failed to read property file: {0}")]
    FileRead(std::io::Error),
    #[error("failed to write property file: {0}")]
    FileWrite(std::io::Error),
    #[error("failed to serialize properties: {0}")]
    Serialization(serde_json::Error),
    #[error("failed to deserialize properties: {0}")]
    Deserialization(serde_json::Error),
    #[error("stored value for {key} is corrupt: {reason}")]
    Corrupt { key: String, reason: String },
}

pub type PropertyResult<T> = std::result::Result<T, PropertyError>;

/// Errors raised while resolving startup configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
