use std::sync::Arc;
use tether_core::config::ServerConfig;
use tether_core::error::Result;
use tether_core::session::{SessionStore, StoreOptions};
use tether_infrastructure::{DisabledSessionStore, build_store};

/// Per-server settings every session actor is started with.
#[derive(Clone)]
pub struct ServerContext {
    pub server_id: String,
    pub store: Arc<dyn SessionStore>,
    /// Passed unchanged to every store call
    pub store_options: StoreOptions,
}

impl ServerContext {
    pub fn new(
        server_id: impl Into<String>,
        store: Arc<dyn SessionStore>,
        store_options: StoreOptions,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            store,
            store_options,
        }
    }

    /// A context with no store configured.
    pub fn memory_only(server_id: impl Into<String>) -> Self {
        Self::new(server_id, Arc::new(DisabledSessionStore), StoreOptions::default())
    }

    /// Builds the context, and its store, from server configuration.
    pub async fn from_config(config: &ServerConfig) -> Result<Self> {
        let store = build_store(config).await?;
        let store_options = config
            .active_store()
            .map(|store| store.options.clone())
            .unwrap_or_default();
        Ok(Self::new(config.server_id.clone(), store, store_options))
    }

    pub fn store_enabled(&self) -> bool {
        self.store.is_enabled()
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("server_id", &self.server_id)
            .field("store", &self.store.name())
            .field("store_options", &self.store_options)
            .finish()
    }
}
