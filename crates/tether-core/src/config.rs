//! Server configuration.
//!
//! ```toml
//! server_id = "node-a"
//!
//! [store]
//! enabled = true
//! adapter = "directory"
//! path = "/var/lib/tether/sessions"
//!
//! [store.options]
//! ttl_secs = 3600
//! timeout_ms = 500
//! ```

use crate::error::{Result, TetherError};
use crate::session::StoreOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Identity of this server instance, scopes the session registry
    #[serde(default = "default_server_id")]
    pub server_id: String,
    /// Session store; absent means sessions live in memory only
    #[serde(default)]
    pub store: Option<StoreConfig>,
}

fn default_server_id() -> String {
    "default".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_id: default_server_id(),
            store: None,
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ServerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| TetherError::config(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// The store config when a store is configured and enabled.
    pub fn active_store(&self) -> Option<&StoreConfig> {
        self.store.as_ref().filter(|store| store.enabled)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_id.trim().is_empty() {
            return Err(TetherError::config("server_id must not be empty"));
        }
        if let Some(store) = &self.store {
            store.validate()?;
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreAdapterKind {
    #[default]
    Memory,
    Directory,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StoreConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub adapter: StoreAdapterKind,
    /// Base directory for the `directory` adapter
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub options: StoreOptions,
}

fn default_enabled() -> bool {
    true
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self {
            enabled: true,
            adapter: StoreAdapterKind::Memory,
            path: None,
            options: StoreOptions::default(),
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            adapter: StoreAdapterKind::Directory,
            path: Some(path.into()),
            options: StoreOptions::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.adapter == StoreAdapterKind::Directory && self.path.is_none() {
            return Err(TetherError::config(
                "store adapter 'directory' requires a path",
            ));
        }
        Ok(())
    }
}
