//! The per-session actor.
//!
//! One tokio task per session id owns the session's [`SessionState`] and
//! handles [`SessionCommand`]s one at a time, in arrival order. Store calls
//! are made inline, so a reply is only sent once the store has answered.

use super::context::ServerContext;
use super::handle::SessionHandle;
use serde_json::{Map, Value};
use tether_core::error::{Result, TetherError};
use tether_core::session::{LogLevel, SessionPatch, SessionState};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const MAILBOX_CAPACITY: usize = 64;

/// Commands handled by the session actor.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    UpdateFromInitialization {
        protocol_version: String,
        client_info: Map<String, Value>,
        client_capabilities: Map<String, Value>,
        reply_tx: oneshot::Sender<()>,
    },
    MarkInitialized {
        reply_tx: oneshot::Sender<()>,
    },
    TrackRequest {
        request_id: String,
        method: String,
        reply_tx: oneshot::Sender<()>,
    },
    CompleteRequest {
        request_id: String,
        reply_tx: oneshot::Sender<Option<String>>,
    },
    SetLogLevel {
        level: LogLevel,
        reply_tx: oneshot::Sender<()>,
    },
    Get {
        reply_tx: oneshot::Sender<SessionState>,
    },
    RefreshFromStore {
        reply_tx: oneshot::Sender<SessionState>,
    },
    Stop {
        reply_tx: oneshot::Sender<()>,
    },
    #[cfg(test)]
    Crash,
}

pub(crate) type SessionMailbox = mpsc::Sender<SessionCommand>;

pub struct SessionActor {
    state: SessionState,
    ctx: ServerContext,
}

impl SessionActor {
    /// Spawns the actor for `id` and waits until it has loaded its state.
    ///
    /// Returns the handle and the task's join handle; the latter completes
    /// when the actor stops (or panics).
    ///
    /// # Errors
    ///
    /// Returns `ActorUnavailable` if the task died before becoming ready.
    pub async fn start(
        id: impl Into<String>,
        ctx: ServerContext,
    ) -> Result<(SessionHandle, JoinHandle<()>)> {
        let id = id.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();

        let task_id = id.clone();
        let join = tokio::spawn(async move {
            let actor = SessionActor::create(task_id, ctx).await;
            if ready_tx.send(()).is_err() {
                return;
            }
            actor.run(cmd_rx).await;
        });

        ready_rx
            .await
            .map_err(|_| TetherError::actor_unavailable(id.clone()))?;

        Ok((SessionHandle::new(id, cmd_tx), join))
    }

    /// Initial state: the stored record if there is one, fresh state otherwise.
    async fn create(id: String, ctx: ServerContext) -> Self {
        let fresh = SessionState::new(id.clone());

        if !ctx.store_enabled() {
            tracing::debug!(session_id = %id, "Starting session without store");
            return Self { state: fresh, ctx };
        }

        let state = match ctx.store.load(&id, &ctx.store_options).await {
            Ok(Some(stored)) => {
                tracing::debug!(session_id = %id, store = ctx.store.name(), "Restored session from store");
                fresh.merge_remote(stored.normalize(&id))
            }
            Ok(None) => fresh,
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Failed to load session, starting fresh");
                fresh
            }
        };

        Self { state, ctx }
    }

    async fn run(mut self, mut cmd_rx: mpsc::Receiver<SessionCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            match cmd {
                SessionCommand::UpdateFromInitialization {
                    protocol_version,
                    client_info,
                    client_capabilities,
                    reply_tx,
                } => {
                    self.state.protocol_version = Some(protocol_version);
                    self.state.client_info = client_info;
                    self.state.client_capabilities = client_capabilities;
                    let _ = reply_tx.send(());
                }
                SessionCommand::MarkInitialized { reply_tx } => {
                    self.mark_initialized().await;
                    let _ = reply_tx.send(());
                }
                SessionCommand::TrackRequest {
                    request_id,
                    method,
                    reply_tx,
                } => {
                    self.state.pending_requests.insert(request_id, method);
                    let _ = reply_tx.send(());
                }
                SessionCommand::CompleteRequest {
                    request_id,
                    reply_tx,
                } => {
                    let method = self.state.pending_requests.remove(&request_id);
                    let _ = reply_tx.send(method);
                }
                SessionCommand::SetLogLevel { level, reply_tx } => {
                    self.set_log_level(level).await;
                    let _ = reply_tx.send(());
                }
                SessionCommand::Get { reply_tx } => {
                    let _ = reply_tx.send(self.state.clone());
                }
                SessionCommand::RefreshFromStore { reply_tx } => {
                    self.refresh_from_store().await;
                    let _ = reply_tx.send(self.state.clone());
                }
                SessionCommand::Stop { reply_tx } => {
                    let _ = reply_tx.send(());
                    break;
                }
                #[cfg(test)]
                SessionCommand::Crash => panic!("session actor crash requested"),
            }
        }

        tracing::debug!(session_id = %self.state.id, "Session actor stopped");
    }

    async fn mark_initialized(&mut self) {
        self.state.initialized = true;

        if !self.ctx.store_enabled() {
            return;
        }

        let record = self.state.to_record();
        if let Err(e) = self
            .ctx
            .store
            .save(&self.state.id, &record, &self.ctx.store_options)
            .await
        {
            tracing::warn!(session_id = %self.state.id, error = %e, "Failed to persist initialized session");
        }
    }

    async fn set_log_level(&mut self, level: LogLevel) {
        self.state.log_level = level;

        // Before the handshake there is nothing stored to patch; mark_initialized saves it.
        if !self.ctx.store_enabled() || !self.state.initialized {
            return;
        }

        let patch = SessionPatch::new().log_level(level);
        if let Err(e) = self
            .ctx
            .store
            .update(&self.state.id, &patch, &self.ctx.store_options)
            .await
        {
            tracing::warn!(session_id = %self.state.id, error = %e, "Failed to persist log level");
        }
    }

    async fn refresh_from_store(&mut self) {
        if !self.ctx.store_enabled() {
            return;
        }

        let id = self.state.id.clone();
        match self.ctx.store.load(&id, &self.ctx.store_options).await {
            Ok(Some(stored)) => {
                let remote = stored.normalize(&id);
                self.state = self.state.merge_remote(remote);
            }
            Ok(None) => {
                tracing::debug!(session_id = %id, "No stored session to refresh from, keeping local state");
            }
            Err(e) => {
                tracing::warn!(session_id = %id, error = %e, "Session refresh failed, keeping local state");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tether_core::session::{SessionRecord, SessionStore, StoreOptions};
    use tether_infrastructure::InMemorySessionStore;

    fn store_ctx(store: &InMemorySessionStore) -> ServerContext {
        ServerContext::new("node-a", Arc::new(store.clone()), StoreOptions::default())
    }

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_fresh_session_defaults() {
        let (handle, _join) = SessionActor::start("s1", ServerContext::memory_only("node-a"))
            .await
            .unwrap();

        let state = handle.get().await.unwrap();
        assert_eq!(state.id, "s1");
        assert!(!state.initialized);
        assert_eq!(state.protocol_version, None);
        assert!(state.client_info.is_empty());
        assert_eq!(state.log_level, LogLevel::Info);
        assert!(state.pending_requests.is_empty());
    }

    #[tokio::test]
    async fn test_update_from_initialization_is_local_only() {
        let store = InMemorySessionStore::new();
        let (handle, _join) = SessionActor::start("s1", store_ctx(&store)).await.unwrap();

        handle
            .update_from_initialization(
                "2025-06-18",
                object(json!({"name": "client"})),
                object(json!({"roots": {}})),
            )
            .await
            .unwrap();

        let state = handle.get().await.unwrap();
        assert_eq!(state.protocol_version.as_deref(), Some("2025-06-18"));
        assert!(!state.initialized);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_request_tracking() {
        let (handle, _join) = SessionActor::start("s1", ServerContext::memory_only("node-a"))
            .await
            .unwrap();

        handle.track_request("1", "tools/list").await.unwrap();
        handle.track_request("2", "tools/call").await.unwrap();
        assert_eq!(
            handle.complete_request("1").await.unwrap().as_deref(),
            Some("tools/list")
        );
        assert_eq!(handle.complete_request("1").await.unwrap(), None);

        let state = handle.get().await.unwrap();
        assert_eq!(state.pending_requests.len(), 1);
        assert_eq!(state.pending_requests.get("2").map(String::as_str), Some("tools/call"));
    }

    #[tokio::test]
    async fn test_set_log_level_before_initialize_is_not_persisted() {
        let store = InMemorySessionStore::new();
        let (handle, _join) = SessionActor::start("s1", store_ctx(&store)).await.unwrap();

        handle.set_log_level(LogLevel::Warning).await.unwrap();
        assert!(store.is_empty().await);

        handle.mark_initialized().await.unwrap();
        let stored = store
            .load("s1", &StoreOptions::default())
            .await
            .unwrap()
            .unwrap()
            .normalize("s1");
        assert_eq!(stored.log_level.as_deref(), Some("warning"));
    }

    #[tokio::test]
    async fn test_set_log_level_after_initialize_updates_store() {
        let store = InMemorySessionStore::new();
        let (handle, _join) = SessionActor::start("s1", store_ctx(&store)).await.unwrap();
        handle.mark_initialized().await.unwrap();

        handle.set_log_level(LogLevel::Debug).await.unwrap();

        let stored = store
            .load("s1", &StoreOptions::default())
            .await
            .unwrap()
            .unwrap()
            .normalize("s1");
        assert!(stored.initialized);
        assert_eq!(stored.log_level.as_deref(), Some("debug"));
    }

    #[tokio::test]
    async fn test_restore_keeps_key_as_id() {
        let store = InMemorySessionStore::new();
        let mut record = SessionRecord::new("other-id");
        record.initialized = true;
        store
            .save("s1", &record, &StoreOptions::default())
            .await
            .unwrap();

        let (handle, _join) = SessionActor::start("s1", store_ctx(&store)).await.unwrap();
        let state = handle.get().await.unwrap();
        assert_eq!(state.id, "s1");
        assert!(state.initialized);
    }

    #[tokio::test]
    async fn test_stop_ends_task() {
        let (handle, join) = SessionActor::start("s1", ServerContext::memory_only("node-a"))
            .await
            .unwrap();

        handle.stop().await.unwrap();
        join.await.unwrap();

        assert!(!handle.is_alive());
        let err = handle.get().await.unwrap_err();
        assert!(err.is_actor_unavailable());
    }

    #[tokio::test]
    async fn test_crash_surfaces_as_panic() {
        let (handle, join) = SessionActor::start("s1", ServerContext::memory_only("node-a"))
            .await
            .unwrap();

        handle.crash().await;
        let err = join.await.unwrap_err();
        assert!(err.is_panic());
    }
}
