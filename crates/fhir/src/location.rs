//! FHIR-aligned location wire model and translation helpers.

use crate::common::{check_resource_type, parse_id, Identifier, MetaWire, ResourceId};
use crate::{parse_wire, FhirError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational status of a location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocationStatus {
    Active,
    Suspended,
    Inactive,
}

impl LocationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationStatus::Active => "active",
            LocationStatus::Suspended => "suspended",
            LocationStatus::Inactive => "inactive",
        }
    }
}

/// Domain-level carrier for a care location (ward, clinic, bed).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocationData {
    pub id: ResourceId,
    pub identifiers: Vec<Identifier>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<LocationStatus>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl LocationData {
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            identifiers: Vec::new(),
            name: None,
            description: None,
            status: None,
            last_updated: None,
        }
    }
}

/// Location resource operations.
pub struct Location;

impl Location {
    /// Parse a location resource from FHIR JSON.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError`] on schema mismatch, unknown keys, an invalid id, or a
    /// resourceType other than "Location".
    pub fn parse(json_text: &str) -> Result<LocationData, FhirError> {
        let wire: LocationWire = parse_wire(json_text, "Location")?;
        check_resource_type(&wire.resource_type, "Location")?;

        Ok(LocationData {
            id: parse_id(&wire.id, "location")?,
            identifiers: wire.identifier,
            name: wire.name,
            description: wire.description,
            status: wire.status,
            last_updated: wire
                .meta
                .and_then(|m| m.last_updated)
                .and_then(|s| s.parse::<DateTime<Utc>>().ok()),
        })
    }

    /// Render a location resource as FHIR JSON.
    pub fn render(data: &LocationData) -> Result<String, FhirError> {
        let wire = LocationWire {
            resource_type: "Location".to_string(),
            id: data.id.to_string(),
            identifier: data.identifiers.clone(),
            name: data.name.clone(),
            description: data.description.clone(),
            status: data.status,
            meta: data.last_updated.map(|lu| MetaWire {
                last_updated: Some(lu.to_rfc3339()),
            }),
        };
        serde_json::to_string(&wire)
            .map_err(|e| FhirError::Translation(format!("Failed to serialise location: {e}")))
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
struct LocationWire {
    #[serde(rename = "resourceType")]
    pub resource_type: String,

    pub id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifier: Vec<Identifier>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<LocationStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<MetaWire>,
}
