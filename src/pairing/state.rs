//! Pairing state machine
//!
//! Tracks one pairing attempt from the creation of the candidate client to
//! its terminal outcome.

use std::sync::Arc;

use tokio::time::{Duration, Instant};

use crate::protocol::ProtocolClient;
use crate::session::Identity;

/// Pairing lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingPhase {
    /// Candidate client created, nothing started
    Created,
    /// Connecting, waiting for the first exchange code
    AwaitingFirstCode,
    /// First code handed out, waiting for the device to be linked
    AwaitingCompletion,
    /// Device linked and session registered
    Succeeded,
    /// No code in time, or the attempt expired
    TimedOut,
    /// The pairing channel reported an unrecoverable failure
    Failed,
}

impl PairingPhase {
    /// Check if the attempt is over
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PairingPhase::Succeeded | PairingPhase::TimedOut | PairingPhase::Failed
        )
    }
}

/// State of one pairing attempt
pub struct PairingSession {
    /// Attempt ID, unique within one coordinator
    pub id: u64,

    /// Client being paired
    pub client: Arc<dyn ProtocolClient>,

    /// Current phase
    pub phase: PairingPhase,

    /// When the attempt started
    pub started_at: Instant,

    /// Overall deadline, set when the attempt starts
    pub deadline: Option<Instant>,

    /// Exchange codes received so far
    pub codes_seen: u32,

    /// Identity of the linked device
    pub identity: Option<Identity>,
}

impl PairingSession {
    /// Create a new attempt for `client`
    pub fn new(id: u64, client: Arc<dyn ProtocolClient>) -> Self {
        Self {
            id,
            client,
            phase: PairingPhase::Created,
            started_at: Instant::now(),
            deadline: None,
            codes_seen: 0,
            identity: None,
        }
    }

    /// Start connecting; the attempt expires `expiry` from now
    pub fn start(&mut self, expiry: Duration) {
        if self.phase == PairingPhase::Created {
            self.phase = PairingPhase::AwaitingFirstCode;
            self.deadline = Some(Instant::now() + expiry);
        }
    }

    /// First code handed out
    pub fn on_first_code(&mut self) {
        if self.phase == PairingPhase::AwaitingFirstCode {
            self.phase = PairingPhase::AwaitingCompletion;
            self.codes_seen = 1;
        }
    }

    /// A replacement code arrived while waiting for completion
    pub fn on_code_rotated(&mut self) {
        if self.phase == PairingPhase::AwaitingCompletion {
            self.codes_seen += 1;
        }
    }

    /// Device linked and registered as `identity`
    pub fn succeed(&mut self, identity: Identity) {
        if !self.phase.is_terminal() {
            self.phase = PairingPhase::Succeeded;
            self.identity = Some(identity);
        }
    }

    /// No code in time, or the attempt expired
    pub fn time_out(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = PairingPhase::TimedOut;
        }
    }

    /// Unrecoverable failure
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = PairingPhase::Failed;
        }
    }

    /// Check if the attempt is over
    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Time since the attempt started
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

impl std::fmt::Debug for PairingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PairingSession")
            .field("id", &self.id)
            .field("phase", &self.phase)
            .field("codes_seen", &self.codes_seen)
            .field("identity", &self.identity)
            .finish()
    }
}
