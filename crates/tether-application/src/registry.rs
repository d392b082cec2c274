use crate::session::SessionHandle;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Registry key: the owning server and the session id.
type RegistryKey = (String, String);

/// Address book for running session actors.
///
/// Maps `(server id, session id)` to a [`SessionHandle`] so components can
/// reach a session without holding a reference to it. Clones share the same
/// table, so several servers in one process can use one registry.
#[derive(Debug, Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<RegistryKey, SessionHandle>>>,
}

impl SessionRegistry {
    /// Creates a new empty SessionRegistry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handle` under its session id, replacing any previous entry.
    pub async fn register(&self, server_id: &str, handle: SessionHandle) {
        let key = (server_id.to_string(), handle.session_id().to_string());
        let mut sessions = self.sessions.write().await;
        sessions.insert(key, handle);
    }

    /// Removes the entry for `session_id`.
    pub async fn unregister(&self, server_id: &str, session_id: &str) -> Option<SessionHandle> {
        let key = (server_id.to_string(), session_id.to_string());
        let mut sessions = self.sessions.write().await;
        sessions.remove(&key)
    }

    /// Removes the entry only if it still points at `handle`'s actor.
    ///
    /// A restarted actor registered under the same id is left alone.
    pub async fn unregister_actor(&self, server_id: &str, handle: &SessionHandle) -> bool {
        let key = (server_id.to_string(), handle.session_id().to_string());
        let mut sessions = self.sessions.write().await;
        match sessions.get(&key) {
            Some(current) if current.same_actor(handle) => {
                sessions.remove(&key);
                true
            }
            _ => false,
        }
    }

    /// Resolves a live actor for `session_id`.
    pub async fn lookup(&self, server_id: &str, session_id: &str) -> Option<SessionHandle> {
        let key = (server_id.to_string(), session_id.to_string());
        let sessions = self.sessions.read().await;
        sessions.get(&key).filter(|h| h.is_alive()).cloned()
    }

    pub async fn contains(&self, server_id: &str, session_id: &str) -> bool {
        self.lookup(server_id, session_id).await.is_some()
    }

    /// Ids of the live sessions owned by `server_id`, sorted.
    pub async fn session_ids(&self, server_id: &str) -> Vec<String> {
        let sessions = self.sessions.read().await;
        let mut ids: Vec<String> = sessions
            .iter()
            .filter(|((owner, _), handle)| owner == server_id && handle.is_alive())
            .map(|((_, id), _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    /// Removes every entry owned by `server_id`, returning the handles.
    pub async fn drain(&self, server_id: &str) -> Vec<SessionHandle> {
        let mut sessions = self.sessions.write().await;
        let keys: Vec<RegistryKey> = sessions
            .keys()
            .filter(|(owner, _)| owner == server_id)
            .cloned()
            .collect();
        keys.iter().filter_map(|key| sessions.remove(key)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{ServerContext, SessionActor};

    async fn spawn(id: &str) -> SessionHandle {
        let (handle, _join) = SessionActor::start(id, ServerContext::memory_only("node-a"))
            .await
            .unwrap();
        handle
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = SessionRegistry::new();
        registry.register("node-a", spawn("s1").await).await;

        let found = registry.lookup("node-a", "s1").await.unwrap();
        assert_eq!(found.session_id(), "s1");
        assert!(registry.lookup("node-b", "s1").await.is_none());
        assert!(registry.lookup("node-a", "s2").await.is_none());
    }

    #[tokio::test]
    async fn test_dead_handles_are_not_resolved() {
        let registry = SessionRegistry::new();
        let handle = spawn("s1").await;
        registry.register("node-a", handle.clone()).await;

        handle.stop().await.unwrap();
        // The receiver is dropped once the actor task unwinds.
        while handle.is_alive() {
            tokio::task::yield_now().await;
        }

        assert!(!registry.contains("node-a", "s1").await);
        assert!(registry.session_ids("node-a").await.is_empty());
    }

    #[tokio::test]
    async fn test_unregister_actor_ignores_replacement() {
        let registry = SessionRegistry::new();
        let old = spawn("s1").await;
        let new = spawn("s1").await;
        registry.register("node-a", new.clone()).await;

        assert!(!registry.unregister_actor("node-a", &old).await);
        assert!(registry.contains("node-a", "s1").await);
        assert!(registry.unregister_actor("node-a", &new).await);
        assert!(!registry.contains("node-a", "s1").await);
    }

    #[tokio::test]
    async fn test_session_ids_are_scoped_by_server() {
        let registry = SessionRegistry::new();
        registry.register("node-a", spawn("b").await).await;
        registry.register("node-a", spawn("a").await).await;
        registry.register("node-b", spawn("c").await).await;

        assert_eq!(registry.session_ids("node-a").await, vec!["a", "b"]);
        assert_eq!(registry.drain("node-b").await.len(), 1);
        assert!(registry.session_ids("node-b").await.is_empty());
    }
}
