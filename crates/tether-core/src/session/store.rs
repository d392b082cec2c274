//! Session store trait.
//!
//! Defines the interface for durable session persistence shared across
//! server instances.

use super::model::{SessionPatch, SessionRecord};
use super::stored::StoredRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

/// Failures a store adapter can report.
///
/// A missing key is not an error: `load` returns `Ok(None)` for it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// No store is configured or it is disabled
    #[error("no session store configured")]
    NotConfigured,

    /// Backend failure (connectivity, I/O, ...)
    #[error("store backend error: {0}")]
    Backend(String),

    /// The adapter gave up waiting on the backend
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),

    /// A record could not be encoded or decoded
    #[error("store serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    pub fn is_not_configured(&self) -> bool {
        matches!(self, Self::NotConfigured)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        Self::Backend(format!("{} (kind: {:?})", err, err.kind()))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Per-call options handed to every store operation.
///
/// Opaque to session actors: they pass it through unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Record time-to-live in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    /// Upper bound for a single backend call in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Backend-specific keys
    #[serde(default, flatten)]
    pub hints: BTreeMap<String, serde_json::Value>,
}

impl StoreOptions {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = Some(ttl.as_secs());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn hint(&self, key: &str) -> Option<&serde_json::Value> {
        self.hints.get(key)
    }
}

/// An abstract store for session records.
///
/// This trait decouples session actors from the storage mechanism
/// (in-memory, files, remote cache). Every operation takes the option set
/// the server was configured with.
///
/// # Implementation Notes
///
/// - `update` must merge atomically with respect to other `update`/`save`
///   calls on the same id from the same process.
/// - Timeouts must surface as [`StoreError::Timeout`], never block forever.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Short adapter name for logs.
    fn name(&self) -> &'static str;

    /// Whether this store is configured and enabled.
    ///
    /// Actors skip every store call when this is false.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Writes `record` under `id`, replacing any existing record.
    async fn save(&self, id: &str, record: &SessionRecord, opts: &StoreOptions) -> StoreResult<()>;

    /// Loads the record stored under `id`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(record))`: Record found
    /// - `Ok(None)`: No record for `id`
    /// - `Err(_)`: Backend failure
    async fn load(&self, id: &str, opts: &StoreOptions) -> StoreResult<Option<StoredRecord>>;

    /// Merges the set fields of `patch` into the record under `id`.
    ///
    /// Behaves as `save` of the patch fields when no record exists.
    async fn update(&self, id: &str, patch: &SessionPatch, opts: &StoreOptions) -> StoreResult<()>;

    /// Removes the record under `id`. Succeeds when it is already absent.
    async fn delete(&self, id: &str, opts: &StoreOptions) -> StoreResult<()>;

    /// Lists the ids of all stored sessions.
    async fn list_active(&self, opts: &StoreOptions) -> StoreResult<Vec<String>>;
}
