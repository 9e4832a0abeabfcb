//! Resource dispatch by `resourceType`.

use crate::common::ResourceId;
use crate::{
    FhirError, Location, LocationData, Patient, PatientData, Practitioner, PractitionerData,
};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Resource types known to the context layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Patient,
    Location,
    Practitioner,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Patient => "Patient",
            ResourceType::Location => "Location",
            ResourceType::Practitioner => "Practitioner",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = FhirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Patient" => Ok(ResourceType::Patient),
            "Location" => Ok(ResourceType::Location),
            "Practitioner" => Ok(ResourceType::Practitioner),
            other => Err(FhirError::InvalidInput(format!(
                "Unsupported resourceType '{other}'"
            ))),
        }
    }
}

/// A typed domain resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    Patient(PatientData),
    Location(LocationData),
    Practitioner(PractitionerData),
}

impl Resource {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            Resource::Patient(_) => ResourceType::Patient,
            Resource::Location(_) => ResourceType::Location,
            Resource::Practitioner(_) => ResourceType::Practitioner,
        }
    }

    pub fn id(&self) -> &ResourceId {
        match self {
            Resource::Patient(p) => &p.id,
            Resource::Location(l) => &l.id,
            Resource::Practitioner(p) => &p.id,
        }
    }

    /// `Type/id` reference, used in logs.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.resource_type(), self.id())
    }

    /// Serialise with the resource's own FHIR JSON representation.
    pub fn to_json(&self) -> Result<String, FhirError> {
        match self {
            Resource::Patient(p) => Patient::render(p),
            Resource::Location(l) => Location::render(l),
            Resource::Practitioner(p) => Practitioner::render(p),
        }
    }

    /// Parse FHIR JSON, choosing the resource by its `resourceType` member.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidJson`] when the text is not a JSON object with a
    /// `resourceType`, [`FhirError::InvalidInput`] for unsupported types, and the resource
    /// parser's error otherwise.
    pub fn from_json(json_text: &str) -> Result<Self, FhirError> {
        #[derive(Deserialize)]
        struct Peek {
            #[serde(rename = "resourceType")]
            resource_type: String,
        }

        let peek: Peek = serde_json::from_str(json_text)?;
        match peek.resource_type.parse::<ResourceType>()? {
            ResourceType::Patient => Patient::parse(json_text).map(Resource::Patient),
            ResourceType::Location => Location::parse(json_text).map(Resource::Location),
            ResourceType::Practitioner => {
                Practitioner::parse(json_text).map(Resource::Practitioner)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatches_on_resource_type() {
        let resource =
            Resource::from_json(r#"{"resourceType":"Location","id":"ward-7","name":"Ward 7"}"#)
                .expect("parse");
        assert_eq!(resource.resource_type(), ResourceType::Location);
        assert_eq!(resource.reference(), "Location/ward-7");
    }

    #[test]
    fn json_round_trip_keeps_type() {
        let patient = Resource::Patient(PatientData::new(ResourceId::parse("p1").expect("id")));
        let json = patient.to_json().expect("render");
        assert_eq!(Resource::from_json(&json).expect("parse"), patient);
    }

    #[test]
    fn rejects_unsupported_type() {
        let err = Resource::from_json(r#"{"resourceType":"Observation","id":"o1"}"#)
            .expect_err("unsupported");
        assert!(matches!(err, FhirError::InvalidInput(msg) if msg.contains("Observation")));
    }

    #[test]
    fn rejects_missing_resource_type() {
        let err = Resource::from_json(r#"{"id":"o1"}"#).expect_err("missing resourceType");
        assert!(matches!(err, FhirError::InvalidJson(_)));
    }
}
