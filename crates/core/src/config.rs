//! Node runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into the services that
//! need it. Services never read process-wide environment variables themselves; the parsing
//! helpers here take `Option<String>` so the composition root decides where values come from.

use crate::constants::{
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_REMOTE_EVENTS, DEFAULT_SUBJECTS, MIN_POLL_INTERVAL_MS,
};
use crate::{ConfigError, ConfigResult};
use ctx_broker::NodeId;
use ctx_types::{EventName, SubjectName};
use fhir::search::DEFAULT_MAX_RESULTS;
use fhir::SearchLimits;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Settings for one remote event dispatcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DispatcherConfig {
    pub node_id: NodeId,
    pub poll_interval: Duration,
}

impl DispatcherConfig {
    pub fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Node configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    node_id: NodeId,
    poll_interval: Duration,
    subjects: Vec<SubjectName>,
    remote_events: Vec<EventName>,
    search_limits: SearchLimits,
    property_file: Option<PathBuf>,
}

impl NodeConfig {
    /// Create a new `NodeConfig`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if no subjects are configured or the poll interval
    /// is below the minimum.
    pub fn new(
        node_id: NodeId,
        poll_interval: Duration,
        subjects: Vec<SubjectName>,
        remote_events: Vec<EventName>,
        search_limits: SearchLimits,
        property_file: Option<PathBuf>,
    ) -> ConfigResult<Self> {
        if subjects.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "CTX_SUBJECTS",
                value: String::new(),
                reason: "at least one context subject is required".into(),
            });
        }
        if poll_interval < Duration::from_millis(MIN_POLL_INTERVAL_MS) {
            return Err(ConfigError::InvalidValue {
                key: "CTX_POLL_INTERVAL_MS",
                value: poll_interval.as_millis().to_string(),
                reason: format!("must be at least {MIN_POLL_INTERVAL_MS}ms"),
            });
        }

        Ok(Self {
            node_id,
            poll_interval,
            subjects,
            remote_events,
            search_limits,
            property_file,
        })
    }

    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn subjects(&self) -> &[SubjectName] {
        &self.subjects
    }

    pub fn remote_events(&self) -> &[EventName] {
        &self.remote_events
    }

    pub fn search_limits(&self) -> SearchLimits {
        self.search_limits
    }

    pub fn property_file(&self) -> Option<&Path> {
        self.property_file.as_deref()
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::new(self.node_id.clone()).with_poll_interval(self.poll_interval)
    }
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse the node id; a missing value generates a random identity.
pub fn node_id_from_env_value(value: Option<String>) -> ConfigResult<NodeId> {
    match trimmed(value) {
        Some(v) => NodeId::new(&v).map_err(|e| ConfigError::InvalidValue {
            key: "CTX_NODE_ID",
            value: v,
            reason: e.to_string(),
        }),
        None => Ok(NodeId::generate()),
    }
}

/// Parse the poll interval in milliseconds.
pub fn poll_interval_from_env_value(value: Option<String>) -> ConfigResult<Duration> {
    let Some(v) = trimmed(value) else {
        return Ok(Duration::from_millis(DEFAULT_POLL_INTERVAL_MS));
    };
    let millis = v.parse::<u64>().map_err(|e| ConfigError::InvalidValue {
        key: "CTX_POLL_INTERVAL_MS",
        value: v.clone(),
        reason: e.to_string(),
    })?;
    Ok(Duration::from_millis(millis))
}

fn comma_list(value: Option<String>, defaults: &[&str]) -> Vec<String> {
    match trimmed(value) {
        Some(v) => v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        None => defaults.iter().map(|s| s.to_string()).collect(),
    }
}

/// Parse a comma-separated list of context subjects.
pub fn subjects_from_env_value(value: Option<String>) -> ConfigResult<Vec<SubjectName>> {
    let mut subjects: Vec<SubjectName> = Vec::new();
    for raw in comma_list(value, DEFAULT_SUBJECTS) {
        let subject = SubjectName::new(&raw).map_err(|e| ConfigError::InvalidValue {
            key: "CTX_SUBJECTS",
            value: raw.clone(),
            reason: e.to_string(),
        })?;
        if !subjects.contains(&subject) {
            subjects.push(subject);
        }
    }
    Ok(subjects)
}

/// Parse a comma-separated list of event names to subscribe remotely.
pub fn remote_events_from_env_value(value: Option<String>) -> ConfigResult<Vec<EventName>> {
    comma_list(value, DEFAULT_REMOTE_EVENTS)
        .into_iter()
        .map(|raw| {
            EventName::new(&raw).map_err(|e| ConfigError::InvalidValue {
                key: "CTX_REMOTE_EVENTS",
                value: raw.clone(),
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Parse the search result cap.
pub fn search_limits_from_env_value(value: Option<String>) -> ConfigResult<SearchLimits> {
    let raw = trimmed(value);
    let max = match &raw {
        Some(v) => v.parse::<u32>().map_err(|e| ConfigError::InvalidValue {
            key: "CTX_MAX_SEARCH_RESULTS",
            value: v.clone(),
            reason: e.to_string(),
        })?,
        None => DEFAULT_MAX_RESULTS,
    };
    SearchLimits::new(max).map_err(|e| ConfigError::InvalidValue {
        key: "CTX_MAX_SEARCH_RESULTS",
        value: raw.unwrap_or_default(),
        reason: e.to_string(),
    })
}

/// Parse the optional property file location.
pub fn property_file_from_env_value(value: Option<String>) -> Option<PathBuf> {
    trimmed(value).map(PathBuf::from)
}
