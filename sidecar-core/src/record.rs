/*!
In-memory form of the custom store file.

The file body is a JSON object mapping each key to
`{"persistent": bool, "value": <any>}`. One key is reserved for the
fingerprint of the base save the record was last written against.
*/

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key holding the base save fingerprint inside every record
pub const FINGERPRINT_KEY: &str = "sidecar.BaseSaveFingerprint";

/// One stored value and its persistence flag
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct StoreEntry {
    /// Keep the entry on load even when no cell claims it
    pub persistent: bool,

    /// Serialized value; its shape is owned by whichever extension registers the key
    pub value: serde_json::Value,
}

impl StoreEntry {
    pub fn new(persistent: bool, value: serde_json::Value) -> Self {
        Self { persistent, value }
    }
}

/// Whole contents of the store file
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(transparent)]
pub struct StoreRecord {
    entries: BTreeMap<String, StoreEntry>,
}

impl StoreRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// The fingerprint this record was written against, if present and well-formed
    pub fn fingerprint(&self) -> Option<&str> {
        self.entries
            .get(FINGERPRINT_KEY)
            .and_then(|entry| entry.value.as_str())
    }

    pub fn set_fingerprint(&mut self, fingerprint: impl Into<String>) {
        self.entries.insert(
            FINGERPRINT_KEY.to_string(),
            StoreEntry::new(true, serde_json::Value::String(fingerprint.into())),
        );
    }

    pub fn get(&self, key: &str) -> Option<&StoreEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert or replace an entry, returning the previous one
    pub fn upsert(&mut self, key: impl Into<String>, entry: StoreEntry) -> Option<StoreEntry> {
        self.entries.insert(key.into(), entry)
    }

    pub fn remove(&mut self, key: &str) -> Option<StoreEntry> {
        self.entries.remove(key)
    }

    /// Entries other than the fingerprint
    pub fn values(&self) -> impl Iterator<Item = (&str, &StoreEntry)> {
        self.entries
            .iter()
            .filter(|(key, _)| key.as_str() != FINGERPRINT_KEY)
            .map(|(key, entry)| (key.as_str(), entry))
    }

    /// Drop every non-fingerprint entry for which `keep` returns false
    pub fn retain_values(&mut self, mut keep: impl FnMut(&str, &StoreEntry) -> bool) {
        self.entries
            .retain(|key, entry| key == FINGERPRINT_KEY || keep(key, entry));
    }

    /// Number of entries, including the fingerprint
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
