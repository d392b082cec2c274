//! The "no store configured" SessionStore.

use async_trait::async_trait;
use tether_core::session::{
    SessionPatch, SessionRecord, SessionStore, StoreError, StoreOptions, StoreResult, StoredRecord,
};

/// Store used when no store is configured or the configured one is disabled.
///
/// Reports itself as not enabled, so session actors never call it; any
/// direct call answers [`StoreError::NotConfigured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSessionStore;

#[async_trait]
impl SessionStore for DisabledSessionStore {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn is_enabled(&self) -> bool {
        false
    }

    async fn save(&self, _id: &str, _record: &SessionRecord, _opts: &StoreOptions) -> StoreResult<()> {
        Err(StoreError::NotConfigured)
    }

    async fn load(&self, _id: &str, _opts: &StoreOptions) -> StoreResult<Option<StoredRecord>> {
        Err(StoreError::NotConfigured)
    }

    async fn update(&self, _id: &str, _patch: &SessionPatch, _opts: &StoreOptions) -> StoreResult<()> {
        Err(StoreError::NotConfigured)
    }

    async fn delete(&self, _id: &str, _opts: &StoreOptions) -> StoreResult<()> {
        Err(StoreError::NotConfigured)
    }

    async fn list_active(&self, _opts: &StoreOptions) -> StoreResult<Vec<String>> {
        Err(StoreError::NotConfigured)
    }
}
