//! FHIR-aligned patient wire model and translation helpers.
//!
//! This module provides the domain-level patient type shared as workstation context and the
//! strict JSON wire model used when a patient crosses a node boundary.
//!
//! Responsibilities:
//! - Define the public domain-level type for external API use
//! - Define a strict wire model for serialisation/deserialisation
//! - Provide translation helpers between domain primitives and the wire model
//! - Validate patient structure and enforce required fields

use crate::common::{
    check_resource_type, parse_id, HumanNameWire, Identifier, MetaWire, PersonName, ResourceId,
};
use crate::{parse_wire, FhirError};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Public domain-level types
// ============================================================================

/// Administrative gender.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
    Unknown,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unknown => "unknown",
        }
    }
}

/// Domain-level carrier for patient data (flat structure).
///
/// The wire format supports multiple names, but this flat structure keeps the first (primary)
/// name only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PatientData {
    /// Logical id of the patient resource.
    pub id: ResourceId,

    /// Business identifiers such as the medical record number.
    pub identifiers: Vec<Identifier>,

    /// Primary name.
    pub name: PersonName,

    pub gender: Option<Gender>,

    pub birth_date: Option<NaiveDate>,

    /// Last updated timestamp.
    pub last_updated: Option<DateTime<Utc>>,
}

impl PatientData {
    /// Creates a patient with only an id.
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            identifiers: Vec::new(),
            name: PersonName::default(),
            gender: None,
            birth_date: None,
            last_updated: None,
        }
    }
}

// ============================================================================
// Public Patient operations
// ============================================================================

/// Patient resource operations.
///
/// This is a zero-sized type used for namespacing patient-related operations.
pub struct Patient;

impl Patient {
    /// Parse a patient resource from FHIR JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if:
    /// - the JSON does not represent a valid patient resource,
    /// - any field has an unexpected type,
    /// - any unknown keys are present (due to `#[serde(deny_unknown_fields)]`),
    /// - resourceType is not "Patient".
    pub fn parse(json_text: &str) -> Result<PatientData, FhirError> {
        let wire: PatientWire = parse_wire(json_text, "Patient")?;
        check_resource_type(&wire.resource_type, "Patient")?;
        wire_to_domain(wire)
    }

    /// Render a patient resource as FHIR JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] if serialisation fails.
    pub fn render(data: &PatientData) -> Result<String, FhirError> {
        let wire = domain_to_wire(data);
        serde_json::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise patient: {e}")))
    }
}

// ============================================================================
// Wire types (internal)
// ============================================================================

/// Wire representation of a patient resource.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct PatientWire {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<Gender>,

    #[serde(rename = "birthDate", default, skip_serializing_if = "Option::is_none")]
    pub birth_date: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaWire>,
}

// ============================================================================
// Helper functions (internal)
// ============================================================================

fn wire_to_domain(wire: PatientWire) -> Result<PatientData, FhirError> {
    let id = parse_id(&wire.id, "patient")?;

    let birth_date = wire
        .birth_date
        .as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| FhirError::Translation(format!("Invalid birthDate '{s}': {e}")))
        })
        .transpose()?;

    let last_updated = wire
        .meta
        .and_then(|m| m.last_updated)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok());

    Ok(PatientData {
        id,
        identifiers: wire.identifier,
        name: PersonName::from_wire(wire.name),
        gender: wire.gender,
        birth_date,
        last_updated,
    })
}

fn domain_to_wire(data: &PatientData) -> PatientWire {
    PatientWire {
        resource_type: "Patient".to_string(),
        id: data.id.to_string(),
        identifier: data.identifiers.clone(),
        name: data.name.to_wire(),
        gender: data.gender,
        birth_date: data.birth_date.map(|d| d.format("%Y-%m-%d").to_string()),
        meta: data.last_updated.map(|lu| MetaWire {
            last_updated: Some(lu.to_rfc3339()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::NameUse;

    const SAMPLE: &str = r#"{
  "resourceType": "Patient",
  "id": "90a8d1ea318041d9adb070a834d4e0f6",
  "identifier": [{ "system": "urn:mrn", "value": "MRN-0042" }],
  "name": [
    { "use": "official", "family": "Williams", "given": ["Sarah", "Jane"] },
    { "use": "nickname", "given": ["Sally"] }
  ],
  "gender": "female",
  "birthDate": "1992-03-20",
  "meta": { "lastUpdated": "2026-01-23T13:58:04.099304Z" }
}"#;

    #[test]
    fn parses_sample_patient() {
        let patient = Patient::parse(SAMPLE).expect("parse json");
        assert_eq!(patient.id.as_str(), "90a8d1ea318041d9adb070a834d4e0f6");
        assert_eq!(patient.identifiers[0].to_token(), "urn:mrn|MRN-0042");
        // Flat structure extracts only the first name
        assert_eq!(patient.name.use_type, Some(NameUse::Official));
        assert_eq!(patient.name.family.as_deref(), Some("Williams"));
        assert_eq!(patient.name.given, vec!["Sarah", "Jane"]);
        assert_eq!(patient.gender, Some(Gender::Female));
        assert_eq!(
            patient.birth_date,
            NaiveDate::from_ymd_opt(1992, 3, 20)
        );
        assert_eq!(
            patient.last_updated.map(|d| d.to_rfc3339()).as_deref(),
            Some("2026-01-23T13:58:04.099304+00:00")
        );
    }

    #[test]
    fn render_then_parse_preserves_fields() {
        let patient = Patient::parse(SAMPLE).expect("parse json");
        let rendered = Patient::render(&patient).expect("render");
        assert!(rendered.contains("\"resourceType\":\"Patient\""));
        assert!(!rendered.contains("Sally"));
        assert_eq!(Patient::parse(&rendered).expect("reparse"), patient);
    }

    #[test]
    fn strict_validation_rejects_unknown_keys() {
        let input = r#"{"resourceType":"Patient","id":"p1","unexpected_key":"should_fail"}"#;
        let err = Patient::parse(input).expect_err("should reject unknown key");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("unexpected_key")),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn strict_validation_reports_path_of_wrong_type() {
        let input = r#"{"resourceType":"Patient","id":"p1","name":[{"given":"not_an_array"}]}"#;
        let err = Patient::parse(input).expect_err("should reject wrong type");
        match err {
            FhirError::Translation(msg) => assert!(msg.contains("name[0].given"), "{msg}"),
            other => panic!("expected Translation error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_invalid_resource_type() {
        let input = r#"{"resourceType":"NotPatient","id":"p1"}"#;
        let err = Patient::parse(input).expect_err("should reject invalid resourceType");
        match err {
            FhirError::InvalidInput(msg) => {
                assert!(msg.contains("Patient"));
                assert!(msg.contains("NotPatient"));
            }
            other => panic!("expected InvalidInput error, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_birth_date() {
        let input = r#"{"resourceType":"Patient","id":"p1","birthDate":"20/03/1992"}"#;
        let err = Patient::parse(input).expect_err("should reject birthDate");
        assert!(matches!(err, FhirError::Translation(msg) if msg.contains("birthDate")));
    }

    #[test]
    fn renders_minimal_patient() {
        let data = PatientData::new(ResourceId::parse("p1").expect("valid id"));
        let json = Patient::render(&data).expect("should render minimal patient");
        assert_eq!(json, r#"{"resourceType":"Patient","id":"p1"}"#);
    }
}
