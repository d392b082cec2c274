use anyhow::{Context, Result, bail};
use tether_application::{
    RestartPolicy, ServerContext, SessionActor, SessionRegistry, SessionSupervisor,
};
use tether_core::config::ServerConfig;
use tether_core::session::SessionState;

async fn store_context(config: &ServerConfig) -> Result<ServerContext> {
    let ctx = ServerContext::from_config(config)
        .await
        .context("Failed to open session store")?;
    if !ctx.store_enabled() {
        bail!("No session store configured; pass --config with an enabled [store] section");
    }
    Ok(ctx)
}

pub async fn list(config: &ServerConfig) -> Result<()> {
    let ctx = store_context(config).await?;
    let ids = ctx
        .store
        .list_active(&ctx.store_options)
        .await
        .context("Failed to list sessions")?;

    for id in &ids {
        println!("{}", id);
    }
    tracing::info!(count = ids.len(), store = ctx.store.name(), "Listed stored sessions");
    Ok(())
}

pub async fn recover(config: &ServerConfig) -> Result<()> {
    let ctx = store_context(config).await?;
    let (supervisor, report) =
        SessionSupervisor::start_with_report(ctx, SessionRegistry::new(), RestartPolicy::default())
            .await;

    for id in &report.restored {
        println!("✓ {}", id);
    }
    for (id, error) in &report.failed {
        println!("✗ {} ({})", id, error);
    }

    supervisor.shutdown().await;
    Ok(())
}

pub async fn inspect(config: &ServerConfig, session_id: &str) -> Result<()> {
    let state = restored_state(config, session_id).await?;
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Runs a single actor for `session_id` and returns the state it restored.
async fn restored_state(config: &ServerConfig, session_id: &str) -> Result<SessionState> {
    let ctx = store_context(config).await?;
    let stored = ctx
        .store
        .load(session_id, &ctx.store_options)
        .await
        .context("Failed to load session")?;
    if stored.is_none() {
        bail!("Session not found: {}", session_id);
    }

    let (handle, join) = SessionActor::start(session_id, ctx).await?;
    let state = handle.get().await?;
    handle.stop().await?;
    join.await.context("Session actor failed")?;
    Ok(state)
}

pub async fn purge(config: &ServerConfig, session_id: &str) -> Result<()> {
    let ctx = store_context(config).await?;
    ctx.store
        .delete(session_id, &ctx.store_options)
        .await
        .with_context(|| format!("Failed to delete session {}", session_id))?;
    println!("Deleted session {}", session_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tether_core::config::StoreConfig;
    use tether_core::session::SessionRecord;

    fn directory_config(temp_dir: &TempDir) -> ServerConfig {
        ServerConfig {
            server_id: "cli".to_string(),
            store: Some(StoreConfig::directory(temp_dir.path())),
        }
    }

    #[tokio::test]
    async fn test_restored_state_reads_one_session() {
        let temp_dir = TempDir::new().unwrap();
        let config = directory_config(&temp_dir);
        let ctx = ServerContext::from_config(&config).await.unwrap();

        let mut record = SessionRecord::new("s1");
        record.initialized = true;
        record.protocol_version = Some("2025-06-18".to_string());
        ctx.store.save("s1", &record, &ctx.store_options).await.unwrap();

        let state = restored_state(&config, "s1").await.unwrap();
        assert_eq!(state.id, "s1");
        assert!(state.initialized);
        assert_eq!(state.protocol_version.as_deref(), Some("2025-06-18"));
    }

    #[tokio::test]
    async fn test_restored_state_rejects_unknown_session() {
        let temp_dir = TempDir::new().unwrap();
        let err = restored_state(&directory_config(&temp_dir), "ghost")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Session not found"));
    }

    #[tokio::test]
    async fn test_commands_require_a_store() {
        let err = restored_state(&ServerConfig::default(), "s1").await.unwrap_err();
        assert!(err.to_string().contains("No session store configured"));
    }
}
