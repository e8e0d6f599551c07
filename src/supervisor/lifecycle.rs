//! Supervisor lifecycle
//!
//! Startup restores every persisted session, shutdown disconnects them.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;

use super::config::HubConfig;
use crate::hub::BroadcastHub;
use crate::pairing::PairingCoordinator;
use crate::protocol::{ClientFactory, CredentialFailure};
use crate::registry::SessionRegistry;
use crate::session::{EventBridge, Identity, Session};
use crate::storage::{CredentialRecord, CredentialStore};

/// What happened during [`SessionSupervisor::startup`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartupReport {
    /// Records returned by the store
    pub loaded: usize,
    /// Records ignored because their identity appeared earlier
    pub duplicates: usize,
    /// Records skipped because the identity was already registered
    pub already_registered: usize,
    /// Sessions that connected
    pub connected: Vec<Identity>,
    /// Sessions removed because their credentials are no longer valid
    pub evicted: Vec<Identity>,
    /// Sessions that failed to connect for another reason (kept registered)
    pub failed: Vec<Identity>,
}

/// Owns the registry, hub and pairing coordinator
pub struct SessionSupervisor {
    pub(super) config: HubConfig,
    pub(super) registry: Arc<SessionRegistry>,
    pub(super) hub: Arc<BroadcastHub>,
    pub(super) store: Arc<dyn CredentialStore>,
    pub(super) factory: Arc<dyn ClientFactory>,
    pub(super) pairing: PairingCoordinator,
}

impl SessionSupervisor {
    /// Create a supervisor with an empty registry
    pub fn new(
        config: HubConfig,
        store: Arc<dyn CredentialStore>,
        factory: Arc<dyn ClientFactory>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let hub = Arc::new(BroadcastHub::with_capacity(config.subscriber_queue));
        let pairing = PairingCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&hub),
            Arc::clone(&store),
            Arc::clone(&factory),
            config.clone(),
        );

        Self {
            config,
            registry,
            hub,
            store,
            factory,
            pairing,
        }
    }

    /// Session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Broadcast hub
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    /// Pairing coordinator
    pub fn pairing(&self) -> &PairingCoordinator {
        &self.pairing
    }

    /// Active configuration
    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    /// Restore and connect every persisted session
    pub async fn startup(&self) -> StartupReport {
        let mut report = StartupReport::default();

        let records = match self.store.load_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load credentials, starting empty");
                Vec::new()
            }
        };
        report.loaded = records.len();

        let mut seen = HashSet::new();
        let mut restored = Vec::new();

        for record in records {
            if !seen.insert(record.identity.clone()) {
                tracing::warn!(identity = %record.identity, "Duplicate credential record ignored");
                report.duplicates += 1;
                continue;
            }

            match self.restore(&record).await {
                Some(session) => restored.push(session),
                None => report.already_registered += 1,
            }
        }

        let attempts = restored.iter().map(|session| async move {
            let result = session.connect().await;
            (Arc::clone(session), result)
        });

        for (session, result) in join_all(attempts).await {
            let identity = session.identity().clone();
            match result {
                Ok(()) => {
                    if let Err(e) = session.sync_state().await {
                        tracing::warn!(identity = %identity, error = %e, "State sync failed");
                    }
                    tracing::info!(identity = %identity, "Session restored");
                    report.connected.push(identity);
                }
                Err(e) => match CredentialFailure::detect(&e) {
                    Some(failure) => {
                        self.evict(&identity, failure).await;
                        report.evicted.push(identity);
                    }
                    None => {
                        tracing::warn!(
                            identity = %identity,
                            error = %e,
                            "Connect failed, session kept"
                        );
                        report.failed.push(identity);
                    }
                },
            }
        }

        tracing::info!(
            loaded = report.loaded,
            connected = report.connected.len(),
            evicted = report.evicted.len(),
            failed = report.failed.len(),
            "Startup complete"
        );

        report
    }

    /// Register a persisted session and attach its bridge
    ///
    /// Returns `None` when the identity already had a session.
    async fn restore(&self, record: &CredentialRecord) -> Option<Arc<Session>> {
        let identity = record.identity.clone();
        let (session, created) = self
            .registry
            .register(identity.clone(), || {
                Session::new(identity.clone(), self.factory.restore(record))
            })
            .await;

        if !created {
            return None;
        }

        EventBridge::attach(&self.registry, &self.hub, &session);
        Some(session)
    }

    /// Remove a session whose credentials are no longer valid
    pub(super) async fn evict(&self, identity: &Identity, failure: CredentialFailure) {
        tracing::warn!(identity = %identity, reason = %failure, "Invalid credentials, evicting session");

        if let Err(e) = self.store.delete(identity).await {
            tracing::error!(identity = %identity, error = %e, "Failed to delete credentials");
        }

        self.registry.detach_handler(identity);
        if let Some(session) = self.registry.remove(identity).await {
            if session.is_connected() {
                session.disconnect().await;
            }
        }
    }

    /// Disconnect every session and end every subscription
    pub async fn shutdown(&self) {
        let sessions = self.registry.snapshot().await;
        tracing::info!(sessions = sessions.len(), "Shutting down");

        join_all(sessions.iter().map(|session| async move {
            session.disconnect().await;
            tracing::debug!(identity = %session.identity(), "Session disconnected");
        }))
        .await;

        self.registry.detach_all();
        self.hub.close_all();
    }

    /// Start up, wait for `shutdown`, then shut down
    pub async fn run_until<F>(&self, shutdown: F) -> StartupReport
    where
        F: Future<Output = ()>,
    {
        let report = self.startup().await;

        shutdown.await;
        tracing::info!("Shutdown signal received");

        self.shutdown().await;
        report
    }
}
