//! Session registry implementation
//!
//! The central map of identity to live session, plus the set of attached
//! event handlers.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use super::error::RegistryError;
use super::handlers::HandlerSet;
use crate::session::{Identity, Session};

/// Registry of all live sessions
///
/// Thread-safe via `RwLock`. Lookups (sending, listing) take the read lock;
/// registration and removal take the write lock, so at most one session can
/// ever be stored per identity.
pub struct SessionRegistry {
    /// Map of identity to session
    sessions: RwLock<HashMap<Identity, Arc<Session>>>,

    /// Identities with an attached event handler
    handlers: HandlerSet,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            handlers: HandlerSet::default(),
        }
    }

    /// Register a session for `identity` unless one is already live
    ///
    /// Returns the stored session and whether it was created by this call.
    /// `factory` only runs when the identity is absent, so a duplicate
    /// registration never constructs (or has to clean up) a second session.
    pub async fn register<F>(&self, identity: Identity, factory: F) -> (Arc<Session>, bool)
    where
        F: FnOnce() -> Session,
    {
        let mut sessions = self.sessions.write().await;

        if let Some(existing) = sessions.get(&identity) {
            tracing::warn!(
                identity = %identity,
                "Session already registered, not creating a duplicate"
            );
            return (Arc::clone(existing), false);
        }

        let session = Arc::new(factory());
        sessions.insert(identity.clone(), Arc::clone(&session));

        tracing::info!(
            identity = %identity,
            sessions = sessions.len(),
            "Session registered"
        );

        (session, true)
    }

    /// Get the session for `identity`
    pub async fn get(&self, identity: &Identity) -> Option<Arc<Session>> {
        self.sessions.read().await.get(identity).cloned()
    }

    /// Find a session by full identity or account number
    pub async fn find(&self, selector: &str) -> Option<Arc<Session>> {
        let sessions = self.sessions.read().await;

        if let Some(session) = sessions.get(&Identity::new(selector)) {
            return Some(Arc::clone(session));
        }

        let mut matches: Vec<&Arc<Session>> = sessions
            .values()
            .filter(|session| session.identity().matches(selector))
            .collect();
        matches.sort_by(|a, b| a.identity().cmp(b.identity()));
        matches.first().map(|session| Arc::clone(session))
    }

    /// Like [`find`](Self::find), failing with `NotFound` for unknown selectors
    pub async fn lookup(&self, selector: &str) -> Result<Arc<Session>, RegistryError> {
        self.find(selector)
            .await
            .ok_or_else(|| RegistryError::NotFound(Identity::new(selector)))
    }

    /// Check if `identity` is registered
    pub async fn contains(&self, identity: &Identity) -> bool {
        self.sessions.read().await.contains_key(identity)
    }

    /// Remove the session for `identity`
    ///
    /// Does not disconnect it; the caller decides what to do with the
    /// returned session once no registry lock is held.
    pub async fn remove(&self, identity: &Identity) -> Option<Arc<Session>> {
        let mut sessions = self.sessions.write().await;
        let removed = sessions.remove(identity);

        if removed.is_some() {
            tracing::info!(
                identity = %identity,
                sessions = sessions.len(),
                "Session removed"
            );
        }

        removed
    }

    /// Copy of all sessions, sorted by identity
    pub async fn snapshot(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();
        sessions.sort_by(|a, b| a.identity().cmp(b.identity()));
        sessions
    }

    /// Call `f` for every session
    ///
    /// Iterates over a snapshot, so `f` may register or remove sessions.
    pub async fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<Session>),
    {
        for session in self.snapshot().await {
            f(&session);
        }
    }

    /// Number of registered sessions
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Check if no session is registered
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Attach an event handler for `identity` unless one is attached
    ///
    /// `spawn` runs at most once per identity and may return `None` when
    /// there is nothing to attach. Returns whether a handler was attached.
    pub fn attach_handler<F>(&self, identity: &Identity, spawn: F) -> bool
    where
        F: FnOnce() -> Option<JoinHandle<()>>,
    {
        let attached = self.handlers.attach(identity, spawn);
        if attached {
            tracing::info!(identity = %identity, "Event handler attached");
        }
        attached
    }

    /// Stop and forget the event handler of `identity`
    pub fn detach_handler(&self, identity: &Identity) -> bool {
        let detached = self.handlers.detach(identity);
        if detached {
            tracing::info!(identity = %identity, "Event handler detached");
        }
        detached
    }

    /// Check if `identity` has an attached handler
    pub fn has_handler(&self, identity: &Identity) -> bool {
        self.handlers.contains(identity)
    }

    /// Number of attached handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Stop every attached handler
    pub fn detach_all(&self) {
        self.handlers.abort_all();
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::protocol::mock::MockClient;
    use crate::protocol::ProtocolClient;

    fn session(identity: &str) -> Session {
        let client: Arc<dyn ProtocolClient> = Arc::new(MockClient::paired(identity));
        Session::new(Identity::new(identity), client)
    }

    #[tokio::test]
    async fn test_register_and_get() {
        let registry = SessionRegistry::new();
        let id = Identity::new("111:1@s.whatsapp.net");

        let (created, is_new) = registry.register(id.clone(), || session("111:1@s.whatsapp.net")).await;
        assert!(is_new);
        assert_eq!(created.identity(), &id);

        let fetched = registry.get(&id).await.unwrap();
        assert!(Arc::ptr_eq(&created, &fetched));
        assert!(registry.get(&Identity::new("999:1@s")).await.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_register_is_noop() {
        let registry = SessionRegistry::new();
        let id = Identity::new("111:1@s");
        let calls = AtomicUsize::new(0);

        let (first, _) = registry
            .register(id.clone(), || {
                calls.fetch_add(1, Ordering::Relaxed);
                session("111:1@s")
            })
            .await;
        let (second, created) = registry
            .register(id.clone(), || {
                calls.fetch_add(1, Ordering::Relaxed);
                session("111:1@s")
            })
            .await;

        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_register_single_winner() {
        let registry = Arc::new(SessionRegistry::new());
        let id = Identity::new("111:1@s");

        let mut tasks = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                registry.register(id, || session("111:1@s")).await
            }));
        }

        let mut results = Vec::new();
        for task in tasks {
            results.push(task.await.unwrap());
        }

        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        let winner = &results.iter().find(|(_, created)| *created).unwrap().0;
        assert!(results.iter().all(|(s, _)| Arc::ptr_eq(s, winner)));
    }

    #[tokio::test]
    async fn test_find_by_user() {
        let registry = SessionRegistry::new();
        registry.register("222:1@s".into(), || session("222:1@s")).await;
        registry.register("111:3@s".into(), || session("111:3@s")).await;

        let found = registry.find("111").await.unwrap();
        assert_eq!(found.identity().as_str(), "111:3@s");
        assert!(registry.find("222:1@s").await.is_some());
        assert!(registry.find("333").await.is_none());
    }

    #[tokio::test]
    async fn test_lookup_unknown_selector() {
        let registry = SessionRegistry::new();
        registry.register("111:3@s".into(), || session("111:3@s")).await;

        assert_eq!(
            registry.lookup("111").await.unwrap().identity().as_str(),
            "111:3@s"
        );
        assert_eq!(
            registry.lookup("999").await.unwrap_err(),
            RegistryError::NotFound(Identity::new("999"))
        );
    }

    #[tokio::test]
    async fn test_remove_and_snapshot() {
        let registry = SessionRegistry::new();
        registry.register("222:1@s".into(), || session("222:1@s")).await;
        registry.register("111:1@s".into(), || session("111:1@s")).await;

        let ids: Vec<String> = registry
            .snapshot()
            .await
            .iter()
            .map(|s| s.identity().to_string())
            .collect();
        assert_eq!(ids, vec!["111:1@s", "222:1@s"]);

        assert!(registry.remove(&"111:1@s".into()).await.is_some());
        assert!(registry.remove(&"111:1@s".into()).await.is_none());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn test_for_each_does_not_hold_lock() {
        let registry = Arc::new(SessionRegistry::new());
        registry.register("111:1@s".into(), || session("111:1@s")).await;

        let mut seen = Vec::new();
        registry
            .for_each(|s| {
                seen.push(s.identity().clone());
                // A write lock is available while the callback runs
                assert!(registry.sessions.try_write().is_ok());
            })
            .await;
        assert_eq!(seen.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_handler_once() {
        let registry = SessionRegistry::new();
        let id = Identity::new("111:1@s");
        let spawned = AtomicUsize::new(0);

        for _ in 0..3 {
            registry.attach_handler(&id, || {
                spawned.fetch_add(1, Ordering::Relaxed);
                Some(tokio::spawn(std::future::pending::<()>()))
            });
        }

        assert_eq!(spawned.load(Ordering::Relaxed), 1);
        assert!(registry.has_handler(&id));

        assert!(registry.detach_handler(&id));
        assert!(!registry.detach_handler(&id));
        assert!(!registry.has_handler(&id));
    }

    #[tokio::test]
    async fn test_attach_nothing_is_not_recorded() {
        let registry = SessionRegistry::new();
        let id = Identity::new("111:1@s");

        assert!(!registry.attach_handler(&id, || None));
        assert!(!registry.has_handler(&id));
        assert_eq!(registry.handler_count(), 0);
    }
}
