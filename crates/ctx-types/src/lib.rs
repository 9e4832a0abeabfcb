//! Validated primitives shared by the context workspace.
//!
//! Every name that crosses a crate boundary (context subjects, local event names, broker topics)
//! is wrapped in a type that guarantees it was validated once at construction:
//! - [`NonEmptyText`] - trimmed text with at least one non-whitespace character
//! - [`SubjectName`] - the domain a shared context governs (for example `Patient`)
//! - [`EventName`] - a dot-delimited local event name (for example `CONTEXT.CHANGED.Patient`)
//! - [`Topic`] - the broker channel derived from the first segment of an event name

mod names;

pub use names::{EventName, SubjectName, Topic, CONTEXT_CHANGED_EVENT, EVENT_DELIMITER};

/// Errors that can occur when creating validated text types.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TextError {
    #[error("Text cannot be empty")]
    Empty,

    #[error("Invalid event name: '{0}'")]
    InvalidEventName(String),

    #[error("Invalid subject name: '{0}' (must be one word without '.')")]
    InvalidSubjectName(String),
}

/// Trimmed text with at least one non-whitespace character.
///
/// The newtypes in this crate wrap it, so validation happens once when a name enters the system
/// and never again downstream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NonEmptyText(String);

impl NonEmptyText {
    /// Trims `input` and wraps it.
    ///
    /// # Errors
    ///
    /// Returns [`TextError::Empty`] when nothing is left after trimming.
    pub fn new(input: impl AsRef<str>) -> Result<Self, TextError> {
        let trimmed = input.as_ref().trim();
        if trimmed.is_empty() {
            return Err(TextError::Empty);
        }
        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for NonEmptyText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for NonEmptyText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for NonEmptyText {
    type Err = TextError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl serde::Serialize for NonEmptyText {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for NonEmptyText {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NonEmptyText::new(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_input() {
        let text = NonEmptyText::new("  Patient \n").expect("valid text");
        assert_eq!(text.as_str(), "Patient");
    }

    #[test]
    fn rejects_blank_input() {
        assert_eq!(NonEmptyText::new("   ").unwrap_err(), TextError::Empty);
        assert_eq!(NonEmptyText::new("").unwrap_err(), TextError::Empty);
    }

    #[test]
    fn deserialize_rejects_blank_string() {
        let err = serde_json::from_str::<NonEmptyText>("\"  \"").expect_err("blank rejected");
        assert!(err.to_string().contains("empty"));
    }
}
