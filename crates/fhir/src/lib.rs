//! FHIR boundary support for the shared clinical context.
//!
//! This crate provides **domain resources** and **JSON translation helpers** for the values a
//! workstation shares as context (the current patient, location or practitioner), plus the
//! **resource search layer** that turns typed criteria into store queries.
//!
//! This crate focuses on:
//! - FHIR semantic alignment for the handful of fields the context layer needs
//! - strict JSON serialisation/deserialisation with path-aware errors
//! - criteria validation and query building (the store itself is an external collaborator)

pub mod common;
pub mod location;
pub mod patient;
pub mod practitioner;
pub mod resource;
pub mod search;

// Re-export facades
pub use location::Location;
pub use patient::Patient;
pub use practitioner::Practitioner;

// Re-export public domain-level types
pub use common::{Identifier, NameUse, PersonName, ResourceId};
pub use location::{LocationData, LocationStatus};
pub use patient::{Gender, PatientData};
pub use practitioner::PractitionerData;
pub use resource::{Resource, ResourceType};
pub use search::{
    BaseCriteria, Bundle, LocationSearchCriteria, PatientSearchCriteria,
    PractitionerSearchCriteria, ResourceQuery, ResourceSearch, ResourceStore, SearchCriteria,
    SearchLimits,
};

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("resource store error: {0}")]
    Store(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;

/// Deserialise `json_text` into a wire struct, reporting the failing path on mismatch.
pub(crate) fn parse_wire<T>(json_text: &str, label: &str) -> FhirResult<T>
where
    T: serde::de::DeserializeOwned,
{
    let mut deserializer = serde_json::Deserializer::from_str(json_text);
    let parsed = match serde_path_to_error::deserialize::<_, T>(&mut deserializer) {
        Ok(parsed) => parsed,
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            return Err(FhirError::Translation(format!(
                "{label} schema mismatch at {path}: {source}"
            )));
        }
    };
    deserializer.end()?;
    Ok(parsed)
}
