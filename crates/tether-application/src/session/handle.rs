use super::actor::{SessionCommand, SessionMailbox};
use serde_json::{Map, Value};
use tether_core::error::{Result, TetherError};
use tether_core::session::{LogLevel, SessionState};
use tokio::sync::oneshot;

/// Address of a running session actor.
///
/// Cheap to clone. Every call is queued behind the ones sent before it and
/// resolves once the actor has handled it.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    session_id: String,
    cmd_tx: SessionMailbox,
}

impl SessionHandle {
    pub(crate) fn new(session_id: String, cmd_tx: SessionMailbox) -> Self {
        Self { session_id, cmd_tx }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Whether the actor is still accepting commands.
    pub fn is_alive(&self) -> bool {
        !self.cmd_tx.is_closed()
    }

    /// Whether both handles address the same actor instance.
    pub fn same_actor(&self, other: &SessionHandle) -> bool {
        self.cmd_tx.same_channel(&other.cmd_tx)
    }

    /// Records the negotiated handshake parameters. Does not persist.
    pub async fn update_from_initialization(
        &self,
        protocol_version: impl Into<String>,
        client_info: Map<String, Value>,
        client_capabilities: Map<String, Value>,
    ) -> Result<()> {
        let protocol_version = protocol_version.into();
        self.call(|reply_tx| SessionCommand::UpdateFromInitialization {
            protocol_version,
            client_info,
            client_capabilities,
            reply_tx,
        })
        .await
    }

    /// Marks the handshake complete and persists the session when a store is enabled.
    ///
    /// Returns after the store write has finished.
    pub async fn mark_initialized(&self) -> Result<()> {
        self.call(|reply_tx| SessionCommand::MarkInitialized { reply_tx })
            .await
    }

    pub async fn track_request(
        &self,
        request_id: impl Into<String>,
        method: impl Into<String>,
    ) -> Result<()> {
        let request_id = request_id.into();
        let method = method.into();
        self.call(|reply_tx| SessionCommand::TrackRequest {
            request_id,
            method,
            reply_tx,
        })
        .await
    }

    /// Removes a pending request, returning its method if it was tracked.
    pub async fn complete_request(&self, request_id: impl Into<String>) -> Result<Option<String>> {
        let request_id = request_id.into();
        self.call(|reply_tx| SessionCommand::CompleteRequest {
            request_id,
            reply_tx,
        })
        .await
    }

    pub async fn set_log_level(&self, level: LogLevel) -> Result<()> {
        self.call(|reply_tx| SessionCommand::SetLogLevel { level, reply_tx })
            .await
    }

    /// Snapshot of the full session state.
    pub async fn get(&self) -> Result<SessionState> {
        self.call(|reply_tx| SessionCommand::Get { reply_tx }).await
    }

    /// Reconciles with the stored record and returns the resulting state.
    ///
    /// Local state is kept as-is when the store has no record or fails.
    pub async fn refresh_from_store(&self) -> Result<SessionState> {
        self.call(|reply_tx| SessionCommand::RefreshFromStore { reply_tx })
            .await
    }

    /// Stops the actor after the commands already queued.
    pub async fn stop(&self) -> Result<()> {
        self.call(|reply_tx| SessionCommand::Stop { reply_tx }).await
    }

    #[cfg(test)]
    pub(crate) async fn crash(&self) {
        let _ = self.cmd_tx.send(SessionCommand::Crash).await;
    }

    async fn call<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> SessionCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| TetherError::actor_unavailable(self.session_id.clone()))?;
        reply_rx
            .await
            .map_err(|_| TetherError::actor_unavailable(self.session_id.clone()))
    }
}
