use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether_application::{RestartPolicy, ServerContext, SessionRegistry, SessionSupervisor};
use tether_core::config::{ServerConfig, StoreConfig};
use tether_core::session::{
    SessionPatch, SessionRecord, SessionStore, StoreError, StoreOptions, StoreResult, StoredRecord,
};
use tether_infrastructure::InMemorySessionStore;
use tokio::sync::Notify;

async fn seed(store: &dyn SessionStore, id: &str, initialized: bool) {
    let mut record = SessionRecord::new(id);
    record.initialized = initialized;
    record.protocol_version = Some("2025-06-18".to_string());
    store.save(id, &record, &StoreOptions::default()).await.unwrap();
}

/// Wraps a store and panics when loading one specific id.
struct PoisonedStore {
    inner: InMemorySessionStore,
    poisoned_id: &'static str,
}

#[async_trait]
impl SessionStore for PoisonedStore {
    fn name(&self) -> &'static str {
        "poisoned"
    }

    async fn save(&self, id: &str, record: &SessionRecord, opts: &StoreOptions) -> StoreResult<()> {
        self.inner.save(id, record, opts).await
    }

    async fn load(&self, id: &str, opts: &StoreOptions) -> StoreResult<Option<StoredRecord>> {
        if id == self.poisoned_id {
            panic!("corrupt record for {id}");
        }
        self.inner.load(id, opts).await
    }

    async fn update(&self, id: &str, patch: &SessionPatch, opts: &StoreOptions) -> StoreResult<()> {
        self.inner.update(id, patch, opts).await
    }

    async fn delete(&self, id: &str, opts: &StoreOptions) -> StoreResult<()> {
        self.inner.delete(id, opts).await
    }

    async fn list_active(&self, opts: &StoreOptions) -> StoreResult<Vec<String>> {
        self.inner.list_active(opts).await
    }
}

/// Wraps a store and holds every load of one id until released.
struct HeldStore {
    inner: InMemorySessionStore,
    held_id: &'static str,
    loading: Notify,
    release: Notify,
}

impl HeldStore {
    fn new(held_id: &'static str) -> Self {
        Self {
            inner: InMemorySessionStore::new(),
            held_id,
            loading: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait]
impl SessionStore for HeldStore {
    fn name(&self) -> &'static str {
        "held"
    }

    async fn save(&self, id: &str, record: &SessionRecord, opts: &StoreOptions) -> StoreResult<()> {
        self.inner.save(id, record, opts).await
    }

    async fn load(&self, id: &str, opts: &StoreOptions) -> StoreResult<Option<StoredRecord>> {
        if id == self.held_id {
            self.loading.notify_one();
            self.release.notified().await;
        }
        self.inner.load(id, opts).await
    }

    async fn update(&self, id: &str, patch: &SessionPatch, opts: &StoreOptions) -> StoreResult<()> {
        self.inner.update(id, patch, opts).await
    }

    async fn delete(&self, id: &str, opts: &StoreOptions) -> StoreResult<()> {
        self.inner.delete(id, opts).await
    }

    async fn list_active(&self, opts: &StoreOptions) -> StoreResult<Vec<String>> {
        self.inner.list_active(opts).await
    }
}

/// Store that cannot enumerate.
struct UnlistableStore;

#[async_trait]
impl SessionStore for UnlistableStore {
    fn name(&self) -> &'static str {
        "unlistable"
    }

    async fn save(&self, _id: &str, _record: &SessionRecord, _opts: &StoreOptions) -> StoreResult<()> {
        Ok(())
    }

    async fn load(&self, _id: &str, _opts: &StoreOptions) -> StoreResult<Option<StoredRecord>> {
        Ok(None)
    }

    async fn update(&self, _id: &str, _patch: &SessionPatch, _opts: &StoreOptions) -> StoreResult<()> {
        Ok(())
    }

    async fn delete(&self, _id: &str, _opts: &StoreOptions) -> StoreResult<()> {
        Ok(())
    }

    async fn list_active(&self, _opts: &StoreOptions) -> StoreResult<Vec<String>> {
        Err(StoreError::Timeout(std::time::Duration::from_millis(100)))
    }
}

#[tokio::test]
async fn supervisor_recovers_every_stored_session() {
    let store = Arc::new(InMemorySessionStore::new());
    seed(store.as_ref(), "restored_1", true).await;
    seed(store.as_ref(), "restored_2", false).await;

    let ctx = ServerContext::new("node-a", store.clone(), StoreOptions::default());
    let supervisor = SessionSupervisor::start(ctx, SessionRegistry::new()).await;

    assert_eq!(supervisor.session_ids().await, vec!["restored_1", "restored_2"]);

    let first = supervisor.whereis("restored_1").await.unwrap().get().await.unwrap();
    let second = supervisor.whereis("restored_2").await.unwrap().get().await.unwrap();
    assert_eq!(first.id, "restored_1");
    assert!(first.initialized);
    assert_eq!(second.id, "restored_2");
    assert!(!second.initialized);
}

#[tokio::test]
async fn one_failing_restore_does_not_block_the_others() {
    let inner = InMemorySessionStore::new();
    seed(&inner, "good_1", true).await;
    seed(&inner, "bad", true).await;
    seed(&inner, "good_2", true).await;
    let store = Arc::new(PoisonedStore {
        inner,
        poisoned_id: "bad",
    });

    let ctx = ServerContext::new("node-a", store, StoreOptions::default());
    let supervisor = SessionSupervisor::start(ctx, SessionRegistry::new()).await;

    assert_eq!(supervisor.session_ids().await, vec!["good_1", "good_2"]);
    assert!(supervisor.whereis("bad").await.is_none());

    let report = supervisor.recover().await;
    assert_eq!(report.already_running, vec!["good_1", "good_2"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bad");
    assert!(report.failed[0].1.is_actor_unavailable());
}

#[tokio::test]
async fn startup_report_lists_restored_and_failed_ids() {
    let inner = InMemorySessionStore::new();
    seed(&inner, "good", true).await;
    seed(&inner, "bad", true).await;
    let store = Arc::new(PoisonedStore {
        inner,
        poisoned_id: "bad",
    });

    let ctx = ServerContext::new("node-a", store, StoreOptions::default());
    let (supervisor, report) =
        SessionSupervisor::start_with_report(ctx, SessionRegistry::new(), RestartPolicy::default())
            .await;

    assert_eq!(report.restored, vec!["good"]);
    assert!(report.already_running.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "bad");
    assert_eq!(supervisor.session_ids().await, vec!["good"]);
}

#[tokio::test]
async fn slow_load_does_not_hold_up_other_ids() {
    let store = Arc::new(HeldStore::new("slow"));
    let ctx = ServerContext::new("node-a", store.clone(), StoreOptions::default());
    let supervisor = SessionSupervisor::start(ctx, SessionRegistry::new()).await;

    let slow = tokio::spawn({
        let supervisor = supervisor.clone();
        async move { supervisor.start_session("slow").await }
    });
    store.loading.notified().await;

    let fast = tokio::time::timeout(Duration::from_secs(5), supervisor.start_session("fast"))
        .await
        .expect("fast id waited for the slow load")
        .unwrap();
    assert_eq!(fast.session_id(), "fast");
    assert!(supervisor.whereis("slow").await.is_none());

    store.release.notify_one();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.session_id(), "slow");
    assert_eq!(supervisor.session_ids().await, vec!["fast", "slow"]);
}

#[tokio::test]
async fn supervisor_starts_when_listing_fails() {
    let ctx = ServerContext::new("node-a", Arc::new(UnlistableStore), StoreOptions::default());
    let supervisor = SessionSupervisor::start(ctx, SessionRegistry::new()).await;

    assert!(supervisor.session_ids().await.is_empty());
    let handle = supervisor.start_session("new").await.unwrap();
    assert_eq!(handle.get().await.unwrap().id, "new");
}

#[tokio::test]
async fn supervisor_without_store_starts_empty() {
    let supervisor =
        SessionSupervisor::start(ServerContext::memory_only("node-a"), SessionRegistry::new()).await;
    assert!(supervisor.session_ids().await.is_empty());
    assert!(supervisor.recover().await.restored.is_empty());
}

#[tokio::test]
async fn restart_from_directory_store_restores_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let config = ServerConfig {
        server_id: "node-a".to_string(),
        store: Some(StoreConfig::directory(temp_dir.path())),
    };

    // First server lifetime: negotiate a session and shut down.
    {
        let ctx = ServerContext::from_config(&config).await.unwrap();
        let supervisor = SessionSupervisor::start(ctx, SessionRegistry::new()).await;
        let handle = supervisor.start_session("conn-1").await.unwrap();
        handle
            .update_from_initialization(
                "2025-06-18",
                json!({"name": "agent"}).as_object().cloned().unwrap(),
                json!({}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        handle.mark_initialized().await.unwrap();
        handle.track_request("42", "tools/call").await.unwrap();
        supervisor.shutdown().await;
    }

    // Second lifetime: a fresh supervisor finds it again.
    let ctx = ServerContext::from_config(&config).await.unwrap();
    let supervisor = SessionSupervisor::start(ctx, SessionRegistry::new()).await;
    let state = supervisor.whereis("conn-1").await.unwrap().get().await.unwrap();

    assert!(state.initialized);
    assert_eq!(state.protocol_version.as_deref(), Some("2025-06-18"));
    assert_eq!(state.client_info.get("name"), Some(&json!("agent")));
    assert!(state.pending_requests.is_empty());
}

#[tokio::test]
async fn servers_sharing_a_registry_stay_separate() {
    let store = Arc::new(InMemorySessionStore::new());
    seed(store.as_ref(), "shared", true).await;
    let registry = SessionRegistry::new();

    let a = SessionSupervisor::start(
        ServerContext::new("node-a", store.clone(), StoreOptions::default()),
        registry.clone(),
    )
    .await;
    let b = SessionSupervisor::start(
        ServerContext::new("node-b", store.clone(), StoreOptions::default()),
        registry.clone(),
    )
    .await;

    let handle_a = a.whereis("shared").await.unwrap();
    let handle_b = b.whereis("shared").await.unwrap();
    assert!(!handle_a.same_actor(&handle_b));

    a.terminate_session("shared", false).await.unwrap();
    assert!(a.whereis("shared").await.is_none());
    assert!(b.whereis("shared").await.is_some());
}
