//! Device pairing
//!
//! A new session is provisioned by pairing a fresh protocol client: the
//! client produces rotating exchange codes until the user links the device,
//! after which the resulting session is registered and wired into the hub.

pub mod coordinator;
pub mod state;

pub use coordinator::{LoginResponse, LoginStatus, PairingAttempt, PairingCoordinator, PairingOutcome};
pub use state::{PairingPhase, PairingSession};
