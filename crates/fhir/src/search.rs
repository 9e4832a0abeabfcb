//! Resource search layer.
//!
//! Translates typed criteria into a [`ResourceQuery`] and runs it against a [`ResourceStore`].
//!
//! Every query carries a `_count` clamped by [`SearchLimits`], and criteria must narrow the
//! result set before they are used: a criteria object with no narrowing filter is rejected
//! instead of being sent as an unconstrained query. Qualifiers such as gender, status or
//! `active` refine a search but do not make it valid on their own.

use crate::common::{Identifier, ResourceId};
use crate::patient::Gender;
use crate::{FhirError, FhirResult, LocationStatus, Resource, ResourceType};
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Result cap applied when neither the criteria nor the configuration says otherwise.
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// Upper bound on the number of results a single query may request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchLimits {
    max_results: u32,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

impl SearchLimits {
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] if `max_results` is zero.
    pub fn new(max_results: u32) -> FhirResult<Self> {
        if max_results == 0 {
            return Err(FhirError::InvalidInput(
                "max_results must be at least 1".into(),
            ));
        }
        Ok(Self { max_results })
    }

    pub fn max_results(&self) -> u32 {
        self.max_results
    }

    /// Clamps a requested count into `1..=max_results`; no request means the maximum.
    pub fn clamp(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.max_results)
            .clamp(1, self.max_results)
    }
}

/// Criteria common to every resource search.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BaseCriteria {
    pub max_results: Option<u32>,
    pub id: Option<ResourceId>,
}

/// A typed search request for one resource type.
pub trait SearchCriteria {
    fn resource_type(&self) -> ResourceType;

    fn base(&self) -> &BaseCriteria;

    /// True when at least one resource-specific narrowing filter is set.
    fn has_filters(&self) -> bool;

    /// Adds the resource-specific parameters to `query`.
    fn apply_filters(&self, query: &mut ResourceQuery);

    fn is_valid(&self) -> bool {
        self.base().id.is_some() || self.has_filters()
    }

    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] when the criteria would not narrow the search.
    fn validate(&self) -> FhirResult<()> {
        if self.is_valid() {
            return Ok(());
        }
        Err(FhirError::InvalidInput(format!(
            "{} search criteria must specify at least one filter",
            self.resource_type()
        )))
    }

    /// Validates the criteria and builds the store query.
    fn build_query(&self, limits: &SearchLimits) -> FhirResult<ResourceQuery> {
        self.validate()?;

        let mut query = ResourceQuery::new(self.resource_type());
        query.count = Some(limits.clamp(self.base().max_results));
        if let Some(id) = &self.base().id {
            query.where_eq("_id", id.as_str());
        }
        self.apply_filters(&mut query);
        Ok(query)
    }
}

/// A store query: resource type, result cap and equality parameters in insertion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceQuery {
    pub resource_type: ResourceType,
    pub count: Option<u32>,
    pub params: Vec<(String, String)>,
}

impl ResourceQuery {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            count: None,
            params: Vec::new(),
        }
    }

    pub fn where_eq(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.params.push((name.to_owned(), value.into()));
        self
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Renders the query in FHIR REST search form, e.g. `Patient?family=Smith&_count=20`.
    pub fn to_query_string(&self) -> String {
        let mut parts: Vec<String> = self
            .params
            .iter()
            .map(|(name, value)| {
                format!("{}={}", encode_component(name), encode_component(value))
            })
            .collect();
        if let Some(count) = self.count {
            parts.push(format!("_count={count}"));
        }
        if parts.is_empty() {
            self.resource_type.to_string()
        } else {
            format!("{}?{}", self.resource_type, parts.join("&"))
        }
    }
}

/// Everything except RFC 3986 unreserved characters.
const QUERY_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn encode_component(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_COMPONENT).to_string()
}

/// One page of search results.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Bundle {
    /// Total matches reported by the store, when it knows.
    pub total: Option<u32>,
    pub entries: Vec<Resource>,
    /// Link to the next page, if any.
    pub next: Option<String>,
}

/// Remote resource store (external collaborator).
pub trait ResourceStore: Send + Sync {
    fn search(&self, query: &ResourceQuery) -> FhirResult<Bundle>;
}

// ============================================================================
// Resource-specific criteria
// ============================================================================

/// Patient lookup by demographics or identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PatientSearchCriteria {
    pub base: BaseCriteria,
    pub family: Option<String>,
    pub given: Option<String>,
    pub identifier: Option<Identifier>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<Gender>,
}

impl PatientSearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_family(mut self, family: &str) -> Self {
        self.family = non_blank(family);
        self
    }

    pub fn with_given(mut self, given: &str) -> Self {
        self.given = non_blank(given);
        self
    }

    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_birth_date(mut self, birth_date: NaiveDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_id(mut self, id: ResourceId) -> Self {
        self.base.id = Some(id);
        self
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.base.max_results = Some(max_results);
        self
    }
}

impl SearchCriteria for PatientSearchCriteria {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Patient
    }

    fn base(&self) -> &BaseCriteria {
        &self.base
    }

    fn has_filters(&self) -> bool {
        self.family.is_some()
            || self.given.is_some()
            || self.identifier.is_some()
            || self.birth_date.is_some()
    }

    fn apply_filters(&self, query: &mut ResourceQuery) {
        if let Some(family) = &self.family {
            query.where_eq("family", family.as_str());
        }
        if let Some(given) = &self.given {
            query.where_eq("given", given.as_str());
        }
        if let Some(identifier) = &self.identifier {
            query.where_eq("identifier", identifier.to_token());
        }
        if let Some(birth_date) = self.birth_date {
            query.where_eq("birthdate", birth_date.format("%Y-%m-%d").to_string());
        }
        if let Some(gender) = self.gender {
            query.where_eq("gender", gender.as_str());
        }
    }
}

/// Location lookup by name or identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocationSearchCriteria {
    pub base: BaseCriteria,
    pub name: Option<String>,
    pub identifier: Option<Identifier>,
    pub status: Option<LocationStatus>,
}

impl LocationSearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = non_blank(name);
        self
    }

    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_status(mut self, status: LocationStatus) -> Self {
        self.status = Some(status);
        self
    }
}

impl SearchCriteria for LocationSearchCriteria {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Location
    }

    fn base(&self) -> &BaseCriteria {
        &self.base
    }

    fn has_filters(&self) -> bool {
        self.name.is_some() || self.identifier.is_some()
    }

    fn apply_filters(&self, query: &mut ResourceQuery) {
        if let Some(name) = &self.name {
            query.where_eq("name", name.as_str());
        }
        if let Some(identifier) = &self.identifier {
            query.where_eq("identifier", identifier.to_token());
        }
        if let Some(status) = self.status {
            query.where_eq("status", status.as_str());
        }
    }
}

/// Practitioner lookup by name or identifier.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PractitionerSearchCriteria {
    pub base: BaseCriteria,
    pub name: Option<String>,
    pub identifier: Option<Identifier>,
    pub active: Option<bool>,
}

impl PractitionerSearchCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = non_blank(name);
        self
    }

    pub fn with_identifier(mut self, identifier: Identifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = Some(active);
        self
    }
}

impl SearchCriteria for PractitionerSearchCriteria {
    fn resource_type(&self) -> ResourceType {
        ResourceType::Practitioner
    }

    fn base(&self) -> &BaseCriteria {
        &self.base
    }

    fn has_filters(&self) -> bool {
        self.name.is_some() || self.identifier.is_some()
    }

    fn apply_filters(&self, query: &mut ResourceQuery) {
        if let Some(name) = &self.name {
            query.where_eq("name", name.as_str());
        }
        if let Some(identifier) = &self.identifier {
            query.where_eq("identifier", identifier.to_token());
        }
        if let Some(active) = self.active {
            query.where_eq("active", active.to_string());
        }
    }
}

fn non_blank(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

// ============================================================================
// Search service
// ============================================================================

/// Runs validated, clamped searches against a store.
pub struct ResourceSearch<S> {
    store: S,
    limits: SearchLimits,
}

impl<S: ResourceStore> ResourceSearch<S> {
    pub fn new(store: S, limits: SearchLimits) -> Self {
        Self { store, limits }
    }

    pub fn limits(&self) -> SearchLimits {
        self.limits
    }

    /// Validates `criteria`, builds the query and executes it.
    ///
    /// Entries of a different resource type and entries beyond the requested count are
    /// discarded, so a misbehaving store cannot widen the result.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidInput`] for criteria that do not narrow the search, and the
    /// store's error otherwise.
    pub fn search(&self, criteria: &dyn SearchCriteria) -> FhirResult<Bundle> {
        let query = criteria.build_query(&self.limits)?;
        tracing::debug!("resource search: {}", query.to_query_string());

        let mut bundle = self.store.search(&query)?;
        let expected = criteria.resource_type();
        let before = bundle.entries.len();
        bundle.entries.retain(|r| r.resource_type() == expected);
        if bundle.entries.len() != before {
            tracing::warn!(
                "resource store returned {} entries that are not {}",
                before - bundle.entries.len(),
                expected
            );
        }
        let cap = usize::try_from(query.count.unwrap_or(self.limits.max_results()))
            .unwrap_or(usize::MAX);
        bundle.entries.truncate(cap);
        Ok(bundle)
    }
}
