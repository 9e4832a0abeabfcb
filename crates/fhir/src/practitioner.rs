//! FHIR-aligned practitioner wire model and translation helpers.
//!
//! The workstation's "current user" context carries a practitioner.

use crate::common::{
    check_resource_type, parse_id, HumanNameWire, Identifier, MetaWire, PersonName, ResourceId,
};
use crate::{parse_wire, FhirError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Domain-level carrier for practitioner data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PractitionerData {
    pub id: ResourceId,
    pub identifiers: Vec<Identifier>,
    pub name: PersonName,
    pub active: Option<bool>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PractitionerData {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            identifiers: Vec::new(),
            name: PersonName::default(),
            active: None,
            last_updated: None,
        }
    }
}

/// Practitioner resource operations.
pub struct Practitioner;

impl Practitioner {
    /// Parse a practitioner resource from FHIR JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] on schema mismatch, unknown keys, an invalid id, or a
    /// resourceType other than "Practitioner".
    pub fn parse(json_text: &str) -> Result<PractitionerData, FhirError> {
        let wire: PractitionerWire = parse_wire(json_text, "Practitioner")?;
        check_resource_type(&wire.resource_type, "Practitioner")?;

        Ok(PractitionerData {
            id: parse_id(&wire.id, "practitioner")?,
            identifiers: wire.identifier,
            name: PersonName::from_wire(wire.name),
            active: wire.active,
            last_updated: wire
                .meta
                .and_then(|m| m.last_updated)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }

    /// Render a practitioner resource as FHIR JSON.
    pub fn render(data: &PractitionerData) -> Result<String, FhirError> {
        let wire = PractitionerWire {
            resource_type: "Practitioner".to_string(),
            id: data.id.to_string(),
            identifier: data.identifiers.clone(),
            name: data.name.to_wire(),
            active: data.active,
            meta: data.last_updated.map(|lu| MetaWire {
                last_updated: Some(lu.to_rfc3339()),
            }),
        };
        serde_json::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise practitioner: {e}")))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct PractitionerWire {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub name: Vec<HumanNameWire>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaWire>,
}
