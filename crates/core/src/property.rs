//! Small persisted key/value settings, and remembered context selections.

use crate::constants::SELECTION_PROPERTY_PREFIX;
use crate::context::{ContextChange, ContextSubscriber, PendingOutcome};
use crate::payload::{self, Payload};
use crate::{PropertyError, PropertyResult, SubscriberFault};
use ctx_broker::PayloadEncoding;
use ctx_types::SubjectName;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tempfile::NamedTempFile;

pub trait PropertyStore: Send + Sync {
    fn get(&self, key: &str) -> PropertyResult<Option<String>>;

    /// Stores `value` under `key`; `None` removes the key.
    fn set(&self, key: &str, value: Option<&str>) -> PropertyResult<()>;
}

/// Process-lifetime property store.
#[derive(Debug, Default)]
pub struct InMemoryPropertyStore {
    values: RwLock<BTreeMap<String, String>>,
}

impl InMemoryPropertyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PropertyStore for InMemoryPropertyStore {
    fn get(&self, key: &str) -> PropertyResult<Option<String>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Option<&str>) -> PropertyResult<()> {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        match value {
            Some(v) => values.insert(key.to_string(), v.to_string()),
            None => values.remove(key),
        };
        Ok(())
    }
}

/// Property store backed by a single JSON object on disk.
///
/// Every write replaces the file atomically: the new content goes to a temporary file in the
/// same directory which is then renamed over the original.
#[derive(Debug)]
pub struct JsonFilePropertyStore {
    path: PathBuf,
    values: RwLock<BTreeMap<String, String>>,
}

impl JsonFilePropertyStore {
    /// Opens the store at `path`, loading existing values. A missing file is an empty store.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::FileRead`] if the file cannot be read and
    /// [`PropertyError::Deserialization`] if it is not a JSON object of strings.
    pub fn open(path: impl Into<PathBuf>) -> PropertyResult<Self> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(PropertyError::Deserialization)?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(PropertyError::FileRead(e)),
        };
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &BTreeMap<String, String>) -> PropertyResult<()> {
        let json = serde_json::to_string_pretty(values).map_err(PropertyError::Serialization)?;
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(PropertyError::FileWrite)?;

        // Dropping the temporary file on any error removes it.
        let mut temp_file = NamedTempFile::new_in(&dir).map_err(PropertyError::FileWrite)?;
        temp_file
            .write_all(json.as_bytes())
            .map_err(PropertyError::FileWrite)?;
        temp_file
            .persist(&self.path)
            .map_err(|e| PropertyError::FileWrite(e.error))?;
        Ok(())
    }
}

impl PropertyStore for JsonFilePropertyStore {
    fn get(&self, key: &str) -> PropertyResult<Option<String>> {
        Ok(self
            .values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn set(&self, key: &str, value: Option<&str>) -> PropertyResult<()> {
        // Held across the write so concurrent setters cannot persist out of order.
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = values.clone();
        match value {
            Some(v) => next.insert(key.to_string(), v.to_string()),
            None => next.remove(key),
        };
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredSelection {
    encoding: PayloadEncoding,
    body: String,
}

/// Remembers the last committed value of each subject so it can be restored at startup.
pub struct SelectionMemory {
    store: Arc<dyn PropertyStore>,
}

impl SelectionMemory {
    pub fn new(store: Arc<dyn PropertyStore>) -> Self {
        Self { store }
    }

    pub fn key(subject: &SubjectName) -> String {
        format!("{SELECTION_PROPERTY_PREFIX}{subject}")
    }

    pub fn remember(&self, subject: &SubjectName, value: Option<&Payload>) -> PropertyResult<()> {
        let key = Self::key(subject);
        let Some(value) = value else {
            return self.store.set(&key, None);
        };
        let (encoding, body) = payload::encode(Some(value)).map_err(|e| PropertyError::Corrupt {
            key: key.clone(),
            reason: e.to_string(),
        })?;
        let stored = serde_json::to_string(&StoredSelection { encoding, body })
            .map_err(PropertyError::Serialization)?;
        self.store.set(&key, Some(&stored))
    }

    /// Returns the remembered value of `subject`, if any.
    ///
    /// # Errors
    ///
    /// Returns [`PropertyError::Corrupt`] if the stored entry cannot be decoded.
    pub fn recall(&self, subject: &SubjectName) -> PropertyResult<Option<Payload>> {
        let key = Self::key(subject);
        let Some(raw) = self.store.get(&key)? else {
            return Ok(None);
        };
        let corrupt = |reason: String| PropertyError::Corrupt {
            key: key.clone(),
            reason,
        };
        let stored: StoredSelection =
            serde_json::from_str(&raw).map_err(|e| corrupt(e.to_string()))?;
        payload::decode(stored.encoding, &stored.body).map_err(|e| corrupt(e.to_string()))
    }
}

impl ContextSubscriber for SelectionMemory {
    fn name(&self) -> &str {
        "selection-memory"
    }

    fn pending(&self, _change: &ContextChange, _silent: bool) -> PendingOutcome {
        PendingOutcome::Accepted
    }

    fn committed(&self, change: &ContextChange) -> Result<(), SubscriberFault> {
        self.remember(&change.subject, change.proposed.as_ref())
            .map_err(|e| SubscriberFault::new(self.name(), e.to_string()))
    }
}
