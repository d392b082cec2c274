//! In-memory SessionStore implementation.
//!
//! Process-local and non-durable. Used as the test double for the store
//! contract and for single-node deployments that still want TTL handling.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::session::{
    SessionPatch, SessionRecord, SessionStore, StoreOptions, StoreResult, StoredRecord,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct Entry {
    record: StoredRecord,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(record: StoredRecord, opts: &StoreOptions) -> Self {
        Self {
            record,
            expires_at: opts.ttl().map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory session store.
///
/// Clones share the same underlying map, so a test can keep one handle and
/// give another to the server under test.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a generic text-keyed document as-is, bypassing the typed path.
    ///
    /// Lets callers seed records written by other producers.
    pub async fn insert_document(&self, id: impl Into<String>, document: Map<String, Value>) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            id.into(),
            Entry {
                record: StoredRecord::Document(document),
                expires_at: None,
            },
        );
    }

    /// Number of live (unexpired) records.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let entries = self.entries.lock().await;
        entries.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn save(&self, id: &str, record: &SessionRecord, opts: &StoreOptions) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            id.to_string(),
            Entry::new(StoredRecord::Structured(record.clone()), opts),
        );
        Ok(())
    }

    async fn load(&self, id: &str, _opts: &StoreOptions) -> StoreResult<Option<StoredRecord>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        match entries.get(id) {
            Some(entry) if entry.is_expired(now) => {
                tracing::debug!(session_id = id, "Dropping expired session record");
                entries.remove(id);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.record.clone())),
            None => Ok(None),
        }
    }

    async fn update(&self, id: &str, patch: &SessionPatch, opts: &StoreOptions) -> StoreResult<()> {
        let now = Instant::now();
        // Held across read-modify-write so concurrent updates cannot drop fields.
        let mut entries = self.entries.lock().await;

        let record = match entries.remove(id) {
            Some(entry) if !entry.is_expired(now) => {
                let mut record = entry.record.normalize(id);
                patch.apply_to(&mut record);
                record
            }
            _ => patch.clone().into_record(id),
        };

        entries.insert(id.to_string(), Entry::new(StoredRecord::Structured(record), opts));
        Ok(())
    }

    async fn delete(&self, id: &str, _opts: &StoreOptions) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(id);
        Ok(())
    }

    async fn list_active(&self, _opts: &StoreOptions) -> StoreResult<Vec<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| !entry.is_expired(now));

        let mut ids: Vec<String> = entries.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
