//! Datatypes shared by several resources.

use crate::FhirError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical id of a resource.
///
/// FHIR restricts ids to 1-64 characters drawn from `A-Z a-z 0-9 - .`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceId(String);

impl ResourceId {
    /// Validates a resource id.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if `input` is empty, longer than 64 characters, or
    /// contains characters outside the FHIR id alphabet.
    pub fn parse(input: &str) -> Result<Self, FhirError> {
        let valid = !input.is_empty()
            && input.len() <= 64
            && input
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
        if !valid {
            return Err(FhirError::InvalidInput(format!(
                "Invalid resource id: '{input}'"
            )));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A business identifier (MRN, NPI, site code, ...).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Identifier {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub value: String,
}

impl Identifier {
    pub fn new(system: Option<&str>, value: &str) -> Self {
        Self {
            system: system.map(str::to_owned),
            value: value.to_owned(),
        }
    }

    /// Renders the identifier as a FHIR token search value (`system|value` or `value`).
    pub fn to_token(&self) -> String {
        match &self.system {
            Some(system) => format!("{system}|{}", self.value),
            None => self.value.clone(),
        }
    }
}

/// Purpose of a human name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NameUse {
    /// Official name.
    Official,
    /// Usual/preferred name.
    Usual,
    /// Temporary name.
    Temp,
    /// Nickname or informal name.
    Nickname,
    /// Anonymous name.
    Anonymous,
    /// Old name (no longer in use).
    Old,
    /// Maiden name.
    Maiden,
}

impl NameUse {
    /// Convert to FHIR wire format string.
    pub(crate) fn to_wire(self) -> &'static str {
        match self {
            NameUse::Official => "official",
            NameUse::Usual => "usual",
            NameUse::Temp => "temp",
            NameUse::Nickname => "nickname",
            NameUse::Anonymous => "anonymous",
            NameUse::Old => "old",
            NameUse::Maiden => "maiden",
        }
    }

    /// Parse from FHIR wire format string.
    pub(crate) fn from_wire(s: &str) -> Option<Self> {
        match s {
            "official" => Some(NameUse::Official),
            "usual" => Some(NameUse::Usual),
            "temp" => Some(NameUse::Temp),
            "nickname" => Some(NameUse::Nickname),
            "anonymous" => Some(NameUse::Anonymous),
            "old" => Some(NameUse::Old),
            "maiden" => Some(NameUse::Maiden),
            _ => None,
        }
    }
}

/// Flat view of the primary human name of a person resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PersonName {
    pub use_type: Option<NameUse>,
    pub family: Option<String>,
    pub given: Vec<String>,
}

impl PersonName {
    pub fn is_empty(&self) -> bool {
        self.use_type.is_none() && self.family.is_none() && self.given.is_empty()
    }

    /// "Family, Given Middle" as shown in patient banners.
    pub fn display(&self) -> String {
        let given = self.given.join(" ");
        match (&self.family, given.is_empty()) {
            (Some(family), false) => format!("{family}, {given}"),
            (Some(family), true) => family.clone(),
            (None, _) => given,
        }
    }

    pub(crate) fn from_wire(names: Vec<HumanNameWire>) -> Self {
        // Flat structure keeps only the first (primary) name
        names
            .into_iter()
            .next()
            .map(|n| PersonName {
                use_type: n.use_type.as_deref().and_then(NameUse::from_wire),
                family: n.family,
                given: n.given,
            })
            .unwrap_or_default()
    }

    pub(crate) fn to_wire(&self) -> Vec<HumanNameWire> {
        if self.is_empty() {
            return Vec::new();
        }
        vec![HumanNameWire {
            use_type: self.use_type.map(|u| u.to_wire().to_string()),
            family: self.family.clone(),
            given: self.given.clone(),
        }]
    }
}

// ============================================================================
// Wire types (crate-internal)
// ============================================================================

/// Wire representation of a human name.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct HumanNameWire {
    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub use_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub given: Vec<String>,
}

/// Wire representation of resource metadata.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct MetaWire {
    #[serde(rename = "lastUpdated", default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

pub(crate) fn parse_id(id: &str, label: &str) -> Result<ResourceId, FhirError> {
    ResourceId::parse(id).map_err(|e| FhirError::Translation(format!("Invalid {label} id: {e}")))
}

pub(crate) fn check_resource_type(found: &str, expected: &str) -> Result<(), FhirError> {
    if found != expected {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{expected}', got '{found}'"
        )));
    }
    Ok(())
}
