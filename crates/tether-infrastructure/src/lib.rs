//! Session store adapters and store selection.

pub mod dir_store;
pub mod disabled_store;
pub mod memory_store;

pub use crate::dir_store::DirSessionStore;
pub use crate::disabled_store::DisabledSessionStore;
pub use crate::memory_store::InMemorySessionStore;

use std::future::Future;
use std::sync::Arc;
use tether_core::config::{ServerConfig, StoreAdapterKind, StoreConfig};
use tether_core::error::{Result, TetherError};
use tether_core::session::{SessionStore, StoreError, StoreOptions, StoreResult};

/// Builds the store selected by `config`.
///
/// No store, or a disabled one, yields [`DisabledSessionStore`].
pub async fn build_store(config: &ServerConfig) -> Result<Arc<dyn SessionStore>> {
    match config.active_store() {
        Some(store) => build_configured_store(store).await,
        None => {
            tracing::info!(server_id = %config.server_id, "No session store configured, sessions are memory-only");
            Ok(Arc::new(DisabledSessionStore))
        }
    }
}

async fn build_configured_store(config: &StoreConfig) -> Result<Arc<dyn SessionStore>> {
    config.validate()?;
    match config.adapter {
        StoreAdapterKind::Memory => Ok(Arc::new(InMemorySessionStore::new())),
        StoreAdapterKind::Directory => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| TetherError::config("store adapter 'directory' requires a path"))?;
            let store = DirSessionStore::new(path).await?;
            tracing::info!(path = %store.base_dir().display(), "Using directory session store");
            Ok(Arc::new(store))
        }
    }
}

/// Applies the `timeout_ms` option to a backend call.
///
/// Adapters wrap each backend operation in this so a hung backend surfaces
/// as [`StoreError::Timeout`] instead of stalling the session actor.
pub async fn bounded<T, F>(opts: &StoreOptions, fut: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match opts.timeout() {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| StoreError::Timeout(limit))?,
        None => fut.await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_no_store_config_builds_disabled_store() {
        let store = build_store(&ServerConfig::default()).await.unwrap();
        assert_eq!(store.name(), "disabled");
        assert!(!store.is_enabled());
    }

    #[tokio::test]
    async fn test_disabled_flag_builds_disabled_store() {
        let mut store_config = StoreConfig::memory();
        store_config.enabled = false;
        let config = ServerConfig {
            server_id: "n1".to_string(),
            store: Some(store_config),
        };
        let store = build_store(&config).await.unwrap();
        assert!(!store.is_enabled());
    }

    #[tokio::test]
    async fn test_adapter_selection() {
        let temp_dir = TempDir::new().unwrap();

        let memory = ServerConfig {
            server_id: "n1".to_string(),
            store: Some(StoreConfig::memory()),
        };
        assert_eq!(build_store(&memory).await.unwrap().name(), "memory");

        let directory = ServerConfig {
            server_id: "n1".to_string(),
            store: Some(StoreConfig::directory(temp_dir.path().join("sessions"))),
        };
        let store = build_store(&directory).await.unwrap();
        assert_eq!(store.name(), "directory");
        assert!(temp_dir.path().join("sessions").is_dir());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_times_out() {
        let opts = StoreOptions::default().with_timeout(Duration::from_millis(50));
        let result: StoreResult<()> = bounded(&opts, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(result, Err(StoreError::Timeout(Duration::from_millis(50))));
    }
}
