//! Subject, event and topic names.
//!
//! Local event names are hierarchical and dot-delimited. The broker only knows about topics, and
//! a topic is the first segment of an event name, so `CONTEXT.CHANGED.Patient` travels on the
//! `CONTEXT` topic and carries its full name in the envelope subject.

use crate::{NonEmptyText, TextError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between event name segments.
pub const EVENT_DELIMITER: char = '.';

/// Event name prefix under which committed context changes are announced.
pub const CONTEXT_CHANGED_EVENT: &str = "CONTEXT.CHANGED";

/// Name of a shared context subject.
///
/// A subject name becomes the last segment of its `CONTEXT.CHANGED.<subject>` event name, so it
/// may not contain whitespace or the event delimiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SubjectName(NonEmptyText);

impl SubjectName {
    /// Validates and wraps a subject name.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::InvalidSubjectName`] when
    /// the trimmed name contains whitespace or `.`.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = NonEmptyText::new(input)?;
        if text
            .as_str()
            .chars()
            .any(|c| c.is_whitespace() || c == EVENT_DELIMITER)
        {
            return Err(TextError::InvalidSubjectName(text.as_str().to_owned()));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for SubjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SubjectName {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for SubjectName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        SubjectName::new(&s).map_err(serde::de::Error::custom)
    }
}

/// Broker-level channel name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Topic(NonEmptyText);

impl Topic {
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        NonEmptyText::new(input).map(Self)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Topic {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A dot-delimited local event name.
///
/// Segments must be non-empty and must not contain whitespace, so `CONTEXT..Patient`,
/// `.CONTEXT` and `CONTEXT CHANGED` are all rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct EventName(NonEmptyText);

impl EventName {
    /// Validates and wraps an event name.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] for blank input and [`TextError::InvalidEventName`] when a
    /// segment is empty or contains whitespace.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let text = NonEmptyText::new(input)?;
        let valid = text
            .as_str()
            .split(EVENT_DELIMITER)
            .all(|segment| !segment.is_empty() && !segment.chars().any(char::is_whitespace));
        if !valid {
            return Err(TextError::InvalidEventName(text.as_str().to_owned()));
        }
        Ok(Self(text))
    }

    /// Builds the event name announcing a committed change of `subject`.
    pub fn context_changed(subject: &SubjectName) -> Self {
        Self(NonEmptyText(format!("{CONTEXT_CHANGED_EVENT}{EVENT_DELIMITER}{subject}")))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Returns the broker topic for this event: everything before the first delimiter.
    pub fn topic(&self) -> Topic {
        let first = self
            .as_str()
            .split(EVENT_DELIMITER)
            .next()
            .unwrap_or_else(|| self.as_str());
        Topic(NonEmptyText(first.to_owned()))
    }

    /// Returns true when a listener registered on `self` should receive `event`.
    ///
    /// Matching is segment-wise: `CONTEXT.CHANGED` matches `CONTEXT.CHANGED.Patient` but not
    /// `CONTEXT.CHANGEDX`.
    pub fn matches(&self, event: &EventName) -> bool {
        let prefix = self.as_str();
        let name = event.as_str();
        name == prefix
            || (name.len() > prefix.len()
                && name.starts_with(prefix)
                && name[prefix.len()..].starts_with(EVENT_DELIMITER))
    }

    /// Recovers the subject from a `CONTEXT.CHANGED.<subject>` event name.
    pub fn changed_subject(&self) -> Option<SubjectName> {
        let rest = self
            .as_str()
            .strip_prefix(CONTEXT_CHANGED_EVENT)?
            .strip_prefix(EVENT_DELIMITER)?;
        SubjectName::new(rest).ok()
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EventName {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for EventName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EventName::new(&s).map_err(serde::de::Error::custom)
    }
}
