//! Pairing coordinator
//!
//! Provisions new sessions through the code-exchange protocol:
//!
//! ```text
//! begin()
//!   │  factory.new_device(), open code channel
//!   │  spawn connect()
//!   ▼
//! wait up to code_wait ──── nothing ────► Timeout (candidate dropped)
//!   │ Code(c)
//!   ▼
//! return Code(c) ─── spawn completion task (bounded by pairing_expiry)
//!                      │ Code      -> rotation, keep waiting
//!                      │ Timeout   -> logged, keep waiting
//!                      │ Error     -> logged, keep waiting
//!                      │ closed    -> Failed, disconnect candidate
//!                      │ expiry    -> TimedOut, disconnect candidate
//!                      ▼ Success
//!                    settle, register, attach bridge, sync -> Succeeded
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::state::PairingSession;
use crate::hub::BroadcastHub;
use crate::protocol::{ClientFactory, PairingEvent};
use crate::registry::{RegistryError, SessionRegistry};
use crate::session::{EventBridge, Identity, Session};
use crate::storage::{CredentialRecord, CredentialStore};
use crate::supervisor::HubConfig;

/// Status reported by `start_login`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoginStatus {
    /// A pairing code is ready to be shown
    Code,
    /// No code was produced in time
    Timeout,
    /// Pairing could not start
    Error,
    /// The device was linked without needing a code
    Success,
}

/// Response of `start_login`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginResponse {
    pub status: LoginStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LoginResponse {
    fn code(code: String) -> Self {
        Self {
            status: LoginStatus::Code,
            code: Some(code),
            error: None,
        }
    }

    fn status(status: LoginStatus) -> Self {
        Self {
            status,
            code: None,
            error: None,
        }
    }

    fn error(reason: impl Into<String>) -> Self {
        Self {
            status: LoginStatus::Error,
            code: None,
            error: Some(reason.into()),
        }
    }
}

/// How a pairing attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingOutcome {
    /// Device linked and registered
    Succeeded(Identity),
    /// Expired before the device was linked
    TimedOut,
    /// Unrecoverable failure
    Failed(String),
}

/// Result of [`PairingCoordinator::begin`]
#[derive(Debug)]
pub struct PairingAttempt {
    /// What to report to the caller
    pub response: LoginResponse,
    /// Background completion task, when the attempt is still running
    pub completion: Option<JoinHandle<PairingOutcome>>,
}

impl PairingAttempt {
    fn finished(response: LoginResponse) -> Self {
        Self {
            response,
            completion: None,
        }
    }
}

/// Drives pairing attempts
#[derive(Clone)]
pub struct PairingCoordinator {
    registry: Arc<SessionRegistry>,
    hub: Arc<BroadcastHub>,
    store: Arc<dyn CredentialStore>,
    factory: Arc<dyn ClientFactory>,
    config: HubConfig,
    next_attempt: Arc<AtomicU64>,
}

impl PairingCoordinator {
    /// Create a coordinator
    pub fn new(
        registry: Arc<SessionRegistry>,
        hub: Arc<BroadcastHub>,
        store: Arc<dyn CredentialStore>,
        factory: Arc<dyn ClientFactory>,
        config: HubConfig,
    ) -> Self {
        Self {
            registry,
            hub,
            store,
            factory,
            config,
            next_attempt: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Start pairing and wait for the first code
    ///
    /// When a code is returned, the attempt continues in the background and
    /// `completion` resolves to its outcome.
    pub async fn begin(&self) -> PairingAttempt {
        let id = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let client = self.factory.new_device();
        let mut state = PairingSession::new(id, Arc::clone(&client));

        let Some(mut codes) = client.open_pairing_channel() else {
            state.fail();
            tracing::error!(attempt = id, "Pairing channel unavailable");
            return PairingAttempt::finished(LoginResponse::error("pairing channel unavailable"));
        };

        state.start(self.config.pairing_expiry);
        tracing::info!(attempt = id, "Pairing started");

        let connector = Arc::clone(&client);
        tokio::spawn(async move {
            if let Err(e) = connector.connect().await {
                tracing::warn!(attempt = id, error = %e, "Pairing connect failed");
            }
        });

        let first = tokio::time::timeout(self.config.code_wait, codes.recv()).await;

        match first {
            Ok(Some(PairingEvent::Code(code))) => {
                state.on_first_code();
                tracing::info!(attempt = id, "Pairing code issued");

                let coordinator = self.clone();
                let completion = tokio::spawn(async move { coordinator.complete(state, codes).await });

                PairingAttempt {
                    response: LoginResponse::code(code),
                    completion: Some(completion),
                }
            }
            Ok(Some(PairingEvent::Success)) => {
                tracing::info!(attempt = id, "Pairing succeeded before any code");
                let coordinator = self.clone();
                let completion = tokio::spawn(async move { coordinator.finish(state).await });

                PairingAttempt {
                    response: LoginResponse::status(LoginStatus::Success),
                    completion: Some(completion),
                }
            }
            Ok(Some(PairingEvent::Timeout)) => {
                state.time_out();
                tracing::warn!(attempt = id, "Pairing timed out before issuing a code");
                PairingAttempt::finished(LoginResponse::status(LoginStatus::Timeout))
            }
            Ok(Some(PairingEvent::Error(reason))) => {
                state.fail();
                tracing::warn!(attempt = id, error = %reason, "Pairing failed before issuing a code");
                PairingAttempt::finished(LoginResponse::error(reason))
            }
            Ok(None) => {
                state.fail();
                tracing::warn!(attempt = id, "Pairing channel closed before issuing a code");
                PairingAttempt::finished(LoginResponse::error("pairing channel closed"))
            }
            Err(_) => {
                // The candidate keeps running until its own connection gives up
                state.time_out();
                tracing::warn!(
                    attempt = id,
                    wait_secs = self.config.code_wait.as_secs(),
                    "No pairing code received in time"
                );
                PairingAttempt::finished(LoginResponse::status(LoginStatus::Timeout))
            }
        }
    }

    /// Start pairing and return the first response
    ///
    /// The completion task keeps running after this returns.
    pub async fn start_login(&self) -> LoginResponse {
        self.begin().await.response
    }

    async fn complete(
        self,
        mut state: PairingSession,
        mut codes: mpsc::Receiver<PairingEvent>,
    ) -> PairingOutcome {
        let deadline = state
            .deadline
            .unwrap_or_else(|| tokio::time::Instant::now() + self.config.pairing_expiry);
        let expiry = tokio::time::sleep_until(deadline);
        tokio::pin!(expiry);

        loop {
            tokio::select! {
                _ = &mut expiry => {
                    state.time_out();
                    tracing::warn!(
                        attempt = state.id,
                        codes = state.codes_seen,
                        "Pairing expired"
                    );
                    state.client.disconnect().await;
                    return PairingOutcome::TimedOut;
                }
                event = codes.recv() => {
                    if let Some(event) = &event {
                        tracing::trace!(attempt = state.id, event = event.name(), "Pairing event");
                    }
                    match event {
                        Some(PairingEvent::Success) => return self.finish(state).await,
                        Some(PairingEvent::Code(_)) => {
                            state.on_code_rotated();
                            tracing::debug!(
                                attempt = state.id,
                                codes = state.codes_seen,
                                "Pairing code rotated"
                            );
                        }
                        Some(PairingEvent::Timeout) => {
                            tracing::info!(attempt = state.id, "Pairing code expired, waiting");
                        }
                        Some(PairingEvent::Error(reason)) => {
                            tracing::warn!(attempt = state.id, error = %reason, "Pairing error, waiting");
                        }
                        None => {
                            state.fail();
                            tracing::warn!(attempt = state.id, "Pairing channel closed");
                            state.client.disconnect().await;
                            return PairingOutcome::Failed("pairing channel closed".into());
                        }
                    }
                }
            }
        }
    }

    async fn finish(self, mut state: PairingSession) -> PairingOutcome {
        tokio::time::sleep(self.config.settle_delay).await;

        let client = Arc::clone(&state.client);
        let Some(identity) = client.identity() else {
            state.fail();
            tracing::error!(attempt = state.id, "Paired client has no identity");
            client.disconnect().await;
            return PairingOutcome::Failed(RegistryError::MissingIdentity.to_string());
        };

        let (session, created) = self
            .registry
            .register(identity.clone(), || {
                Session::new(identity.clone(), Arc::clone(&client))
            })
            .await;

        if !created && !session.uses_client(&client) {
            // A live session already owns this identity
            tracing::warn!(
                attempt = state.id,
                identity = %identity,
                "Identity already has a session, dropping paired client"
            );
            client.disconnect().await;
        }

        EventBridge::attach(&self.registry, &self.hub, &session);

        if created {
            let mut record = CredentialRecord::new(identity.clone());
            if let Some(name) = client.display_name() {
                record = record.with_display_name(name);
            }
            if let Err(e) = self.store.save(record).await {
                tracing::warn!(identity = %identity, error = %e, "Failed to persist credentials");
            }
        }

        if let Err(e) = session.sync_state().await {
            tracing::warn!(identity = %identity, error = %e, "Post-login sync failed");
        }

        tracing::info!(
            attempt = state.id,
            identity = %identity,
            codes = state.codes_seen,
            elapsed_ms = state.elapsed().as_millis() as u64,
            "Pairing succeeded"
        );
        state.succeed(identity.clone());

        PairingOutcome::Succeeded(identity)
    }
}
