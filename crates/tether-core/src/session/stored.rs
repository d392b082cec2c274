//! Records as they come back from a store, and their normalization.
//!
//! Stores hand records back in one of two shapes: the typed
//! [`SessionRecord`] (fixed field set), or a generic JSON document whose keys
//! are plain text. Documents are what survive a round trip through a textual
//! backend, and may come from other nodes with missing, null or camelCase keys.

use super::model::SessionRecord;
use serde_json::{Map, Value};

const PROTOCOL_VERSION_KEYS: &[&str] = &["protocol_version", "protocolVersion"];
const INITIALIZED_KEYS: &[&str] = &["initialized"];
const CLIENT_INFO_KEYS: &[&str] = &["client_info", "clientInfo"];
const CLIENT_CAPABILITIES_KEYS: &[&str] = &[
    "client_capabilities",
    "clientCapabilities",
    "capabilities",
];
const LOG_LEVEL_KEYS: &[&str] = &["log_level", "logLevel"];

/// A record loaded from a store, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredRecord {
    /// Fixed field set
    Structured(SessionRecord),
    /// Generic text keys
    Document(Map<String, Value>),
}

impl StoredRecord {
    /// Normalizes either shape into a [`SessionRecord`] keyed by `id`.
    ///
    /// Wrong-shaped values are treated as absent. Never fails.
    pub fn normalize(self, id: &str) -> SessionRecord {
        match self {
            StoredRecord::Structured(mut record) => {
                if record.id.is_empty() {
                    record.id = id.to_string();
                }
                record.log_level = record.log_level.filter(|level| !level.trim().is_empty());
                record
            }
            StoredRecord::Document(doc) => normalize_document(id, &doc),
        }
    }

    /// Parses raw JSON text into a document-shaped record.
    pub fn from_json_str(json: &str) -> serde_json::Result<Self> {
        let doc: Map<String, Value> = serde_json::from_str(json)?;
        Ok(StoredRecord::Document(doc))
    }
}

impl From<SessionRecord> for StoredRecord {
    fn from(record: SessionRecord) -> Self {
        StoredRecord::Structured(record)
    }
}

fn normalize_document(id: &str, doc: &Map<String, Value>) -> SessionRecord {
    let record_id = lookup(doc, &["id"])
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .unwrap_or(id)
        .to_string();

    SessionRecord {
        id: record_id,
        protocol_version: lookup_str(doc, PROTOCOL_VERSION_KEYS),
        initialized: lookup(doc, INITIALIZED_KEYS)
            .and_then(Value::as_bool)
            .unwrap_or(false),
        client_info: lookup_object(doc, CLIENT_INFO_KEYS),
        client_capabilities: lookup_object(doc, CLIENT_CAPABILITIES_KEYS),
        log_level: lookup_str(doc, LOG_LEVEL_KEYS),
    }
}

/// First non-null value under any of `keys`.
fn lookup<'a>(doc: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| doc.get(*key))
        .find(|value| !value.is_null())
}

fn lookup_str(doc: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    lookup(doc, keys)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn lookup_object(doc: &Map<String, Value>, keys: &[&str]) -> Map<String, Value> {
    lookup(doc, keys)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}
