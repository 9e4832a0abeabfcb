//! Envelope model for published messages.

use chrono::{DateTime, Utc};
use ctx_types::{EventName, NonEmptyText, TextError, Topic};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Broker-assigned handle for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Broker-assigned identifier of a published message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Identity of an application node (one workstation session host).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(NonEmptyText);

impl NodeId {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        NonEmptyText::new(input).map(Self)
    }

    /// Generates a random node identity.
    pub fn generate() -> Self {
        Self(
            NonEmptyText::new(Uuid::new_v4().simple().to_string())
                .unwrap_or_else(|_| unreachable!("uuid text is never empty")),
        )
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How an envelope body was encoded by the publisher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadEncoding {
    /// Empty body or plain text.
    #[serde(rename = "none")]
    None,
    /// Generic JSON document.
    #[serde(rename = "json")]
    Json,
    /// A domain resource serialised with its own JSON representation.
    #[serde(rename = "domain-resource")]
    Resource,
}

impl PayloadEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Json => "json",
            Self::Resource => "domain-resource",
        }
    }
}

impl fmt::Display for PayloadEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A published message unit: header metadata plus an encoded body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Assigned by the broker on publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<MessageId>,

    pub topic: Topic,

    /// Full local event name the message was fired under.
    pub subject: EventName,

    pub origin_node: NodeId,

    /// Nodes the message is addressed to; empty means every subscriber.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recipients: Vec<NodeId>,

    pub created_time: DateTime<Utc>,

    /// Assigned by the broker on publish.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_time: Option<DateTime<Utc>>,

    pub payload: String,

    pub payload_encoding: PayloadEncoding,
}

impl Envelope {
    /// Creates an unpublished envelope with an empty body.
    pub fn new(
        topic: Topic,
        subject: EventName,
        origin_node: NodeId,
        created_time: DateTime<Utc>,
    ) -> Self {
        Self {
            message_id: None,
            topic,
            subject,
            origin_node,
            recipients: Vec::new(),
            created_time,
            publication_time: None,
            payload: String::new(),
            payload_encoding: PayloadEncoding::None,
        }
    }

    pub fn with_payload(mut self, encoding: PayloadEncoding, payload: impl Into<String>) -> Self {
        self.payload_encoding = encoding;
        self.payload = payload.into();
        self
    }

    pub fn with_recipients(mut self, recipients: Vec<NodeId>) -> Self {
        self.recipients = recipients;
        self
    }

    /// Returns true when `node` should act on this message.
    pub fn is_addressed_to(&self, node: &NodeId) -> bool {
        self.recipients.is_empty() || self.recipients.contains(node)
    }
}
