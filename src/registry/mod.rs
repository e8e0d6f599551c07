//! Session registry
//!
//! The registry owns every live session, keyed by identity, and guarantees
//! that at most one session exists per identity. It also remembers which
//! identities already have an event handler feeding the broadcast hub.
//!
//! # Architecture
//!
//! ```text
//!                     Arc<SessionRegistry>
//!              ┌──────────────────────────────┐
//!              │ sessions: RwLock<HashMap<    │
//!              │   Identity, Arc<Session>>>   │
//!              │ handlers: Mutex<HashMap<     │
//!              │   Identity, JoinHandle>>     │
//!              └──────────────┬───────────────┘
//!                             │
//!      ┌──────────────────────┼──────────────────────┐
//!      │                      │                      │
//!      ▼                      ▼                      ▼
//! [Supervisor]        [PairingCoordinator]     [send_message]
//! register() at       register() after         find() by account
//! startup, remove()   pairing success          number
//! on eviction
//! ```
//!
//! The registry never calls into the broadcast hub while holding a lock.

mod handlers;

pub mod error;
pub mod store;

pub use error::RegistryError;
pub use store::SessionRegistry;
