use anyhow::Result;
use tether_core::config::{ServerConfig, StoreAdapterKind};

/// Describes the store a server with `config` would use.
pub fn describe(config: &ServerConfig) -> String {
    match config.active_store() {
        None => "none (memory-only sessions)".to_string(),
        Some(store) => match (store.adapter, &store.path) {
            (StoreAdapterKind::Directory, Some(path)) => format!("directory at {}", path.display()),
            (StoreAdapterKind::Directory, None) => "directory (missing path)".to_string(),
            (StoreAdapterKind::Memory, _) => "memory".to_string(),
        },
    }
}

pub fn check(config: &ServerConfig) -> Result<()> {
    config.validate()?;
    println!("server_id: {}", config.server_id);
    println!("store:     {}", describe(config));
    if let Some(store) = config.active_store() {
        println!("options:   {}", serde_json::to_string(&store.options)?);
    }
    Ok(())
}
