//! Session supervision and recovery.
//!
//! `SessionSupervisor` owns the population of session actors for one server:
//! - Recovering actors for every stored session on startup
//! - Starting actors for new connections
//! - Restarting actors that crash, up to a bounded count
//! - Terminating (and optionally purging) sessions
//!
//! Starts are serialized per session id only. A slow store load for one id
//! never holds up another id.

use crate::registry::SessionRegistry;
use crate::session::{ServerContext, SessionActor, SessionHandle};
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tether_core::error::{Result, TetherError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// How often a crashed actor is restarted before it is given up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    pub max_restarts: u32,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self { max_restarts: 3 }
    }
}

/// Outcome of one recovery pass.
#[derive(Debug, Default)]
pub struct RecoveryReport {
    /// Ids an actor was started for
    pub restored: Vec<String>,
    /// Ids that already had a live actor
    pub already_running: Vec<String>,
    /// Ids whose actor failed to start
    pub failed: Vec<(String, TetherError)>,
}

/// One start gate per session id currently being started.
#[derive(Default)]
struct StartGates {
    gates: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StartGates {
    async fn gate(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut gates = self.gates.lock().await;
        Arc::clone(gates.entry(session_id.to_string()).or_default())
    }

    /// Forgets the gate once no other start is holding or waiting on it.
    async fn release(&self, session_id: &str, gate: Arc<Mutex<()>>) {
        let mut gates = self.gates.lock().await;
        let unshared = gates
            .get(session_id)
            .is_some_and(|current| Arc::ptr_eq(current, &gate) && Arc::strong_count(&gate) == 2);
        if unshared {
            gates.remove(session_id);
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.gates.lock().await.len()
    }
}

enum Started {
    Running(SessionHandle),
    Spawned(SessionHandle, JoinHandle<()>),
}

struct SupervisorInner {
    ctx: ServerContext,
    registry: SessionRegistry,
    policy: RestartPolicy,
    gates: StartGates,
}

#[derive(Clone)]
pub struct SessionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl SessionSupervisor {
    /// Starts the supervisor and recovers stored sessions.
    ///
    /// Recovery problems are logged, never returned: the supervisor always starts.
    pub async fn start(ctx: ServerContext, registry: SessionRegistry) -> Self {
        Self::start_with_policy(ctx, registry, RestartPolicy::default()).await
    }

    pub async fn start_with_policy(
        ctx: ServerContext,
        registry: SessionRegistry,
        policy: RestartPolicy,
    ) -> Self {
        Self::start_with_report(ctx, registry, policy).await.0
    }

    /// Like [`start_with_policy`](Self::start_with_policy), also returning
    /// what the startup recovery pass did.
    pub async fn start_with_report(
        ctx: ServerContext,
        registry: SessionRegistry,
        policy: RestartPolicy,
    ) -> (Self, RecoveryReport) {
        let supervisor = Self {
            inner: Arc::new(SupervisorInner {
                ctx,
                registry,
                policy,
                gates: StartGates::default(),
            }),
        };

        let report = supervisor.recover().await;
        tracing::info!(
            server_id = %supervisor.server_id(),
            restored = report.restored.len(),
            failed = report.failed.len(),
            "Session supervisor started"
        );

        (supervisor, report)
    }

    pub fn server_id(&self) -> &str {
        &self.inner.ctx.server_id
    }

    pub fn context(&self) -> &ServerContext {
        &self.inner.ctx
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.inner.registry
    }

    /// Starts an actor for every stored session id that is not running yet.
    ///
    /// Actors load in parallel; one failing id does not affect the others.
    pub async fn recover(&self) -> RecoveryReport {
        let mut report = RecoveryReport::default();
        let ctx = &self.inner.ctx;

        if !ctx.store_enabled() {
            return report;
        }

        let ids = match ctx.store.list_active(&ctx.store_options).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(server_id = %ctx.server_id, error = %e, "Failed to list stored sessions, skipping recovery");
                return report;
            }
        };

        let started = join_all(ids.into_iter().map(|id| async move {
            let outcome = start_supervised(&self.inner, &id).await;
            (id, outcome)
        }))
        .await;

        for (id, outcome) in started {
            match outcome {
                Ok((_, true)) => report.restored.push(id),
                Ok((_, false)) => report.already_running.push(id),
                Err(e) => {
                    tracing::error!(server_id = %ctx.server_id, session_id = %id, error = %e, "Failed to recover session");
                    report.failed.push((id, e));
                }
            }
        }

        report
    }

    /// Returns the running actor for `session_id`, starting one if needed.
    pub async fn start_session(&self, session_id: impl Into<String>) -> Result<SessionHandle> {
        let session_id = session_id.into();
        let (handle, _) = start_supervised(&self.inner, &session_id).await?;
        Ok(handle)
    }

    /// Starts a session under a newly generated id.
    pub async fn start_new_session(&self) -> Result<SessionHandle> {
        self.start_session(uuid::Uuid::new_v4().to_string()).await
    }

    /// Resolves the live actor for `session_id`.
    pub async fn whereis(&self, session_id: &str) -> Option<SessionHandle> {
        self.inner.registry.lookup(self.server_id(), session_id).await
    }

    /// Ids of all live sessions on this server.
    pub async fn session_ids(&self) -> Vec<String> {
        self.inner.registry.session_ids(self.server_id()).await
    }

    /// Stops the actor for `session_id`. With `purge`, also deletes its stored record.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no actor is running and nothing is purged, or the
    /// store error if the purge fails.
    pub async fn terminate_session(&self, session_id: &str, purge: bool) -> Result<()> {
        let ctx = &self.inner.ctx;
        let handle = self.inner.registry.unregister(&ctx.server_id, session_id).await;

        if let Some(handle) = &handle {
            if let Err(e) = handle.stop().await {
                tracing::debug!(session_id, error = %e, "Session actor already gone");
            }
        }

        if purge && ctx.store_enabled() {
            ctx.store.delete(session_id, &ctx.store_options).await?;
            tracing::info!(session_id, "Purged stored session");
            return Ok(());
        }

        match handle {
            Some(_) => Ok(()),
            None => Err(TetherError::not_found("session", session_id)),
        }
    }

    /// Stops every actor owned by this server. Stored records are kept.
    pub async fn shutdown(&self) {
        let handles = self.inner.registry.drain(self.server_id()).await;
        for handle in handles {
            if let Err(e) = handle.stop().await {
                tracing::debug!(session_id = handle.session_id(), error = %e, "Session actor already gone");
            }
        }
        tracing::info!(server_id = %self.server_id(), "Session supervisor stopped");
    }
}

/// Start-or-get for one id, watching the actor if a new one was spawned.
///
/// The flag is true when this call started the actor.
async fn start_supervised(
    inner: &Arc<SupervisorInner>,
    session_id: &str,
) -> Result<(SessionHandle, bool)> {
    match start_gated(inner, session_id).await? {
        Started::Running(handle) => Ok((handle, false)),
        Started::Spawned(handle, join) => {
            tokio::spawn(watch(Arc::clone(inner), handle.clone(), join));
            Ok((handle, true))
        }
    }
}

/// Holds the gate for `session_id` while checking the registry and starting an actor.
async fn start_gated(inner: &SupervisorInner, session_id: &str) -> Result<Started> {
    let gate = inner.gates.gate(session_id).await;
    let permit = gate.lock().await;
    let outcome = spawn_unless_running(inner, session_id).await;
    drop(permit);
    inner.gates.release(session_id, gate).await;
    outcome
}

async fn spawn_unless_running(inner: &SupervisorInner, session_id: &str) -> Result<Started> {
    let server_id = &inner.ctx.server_id;
    if let Some(handle) = inner.registry.lookup(server_id, session_id).await {
        return Ok(Started::Running(handle));
    }

    let (handle, join) = SessionActor::start(session_id, inner.ctx.clone()).await?;
    inner.registry.register(server_id, handle.clone()).await;
    Ok(Started::Spawned(handle, join))
}

/// Waits on an actor task, restarting it if it panics.
async fn watch(inner: Arc<SupervisorInner>, mut handle: SessionHandle, mut join: JoinHandle<()>) {
    let server_id = inner.ctx.server_id.clone();
    let mut restarts = 0;

    loop {
        let outcome = join.await;
        let replaced = !inner.registry.unregister_actor(&server_id, &handle).await;

        let panic = match outcome {
            Ok(()) => return,
            Err(e) if e.is_panic() => e,
            Err(_) => return,
        };

        // Terminated on purpose, or someone else already started a new actor.
        if replaced {
            return;
        }

        if restarts >= inner.policy.max_restarts {
            tracing::error!(
                server_id = %server_id,
                session_id = handle.session_id(),
                restarts,
                "Session actor keeps crashing, giving up"
            );
            return;
        }
        restarts += 1;

        tracing::warn!(
            server_id = %server_id,
            session_id = handle.session_id(),
            restarts,
            error = %panic,
            "Session actor crashed, restarting"
        );

        let restarted = start_gated(&inner, handle.session_id()).await;
        match restarted {
            Ok(Started::Spawned(new_handle, new_join)) => {
                handle = new_handle;
                join = new_join;
            }
            Ok(Started::Running(_)) => return,
            Err(e) => {
                tracing::error!(server_id = %server_id, session_id = handle.session_id(), error = %e, "Failed to restart session");
                return;
            }
        }
    }
}
