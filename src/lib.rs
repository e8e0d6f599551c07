//! Multi-tenant session hub
//!
//! Keeps many independently authenticated account sessions alive at once,
//! fans their inbound messages out to any number of stream subscribers, and
//! provisions new sessions through a time-bounded pairing protocol.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use session_hub::protocol::mock::MockFactory;
//! use session_hub::storage::MemoryStore;
//! use session_hub::{HubConfig, SessionSupervisor};
//!
//! #[tokio::main]
//! async fn main() {
//!     let supervisor = SessionSupervisor::new(
//!         HubConfig::from_env(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(MockFactory::new()),
//!     );
//!
//!     let mut events = supervisor.stream_events();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{} -> {}: {:?}", event.from, event.to, event.text_content());
//!         }
//!     });
//!
//!     supervisor
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await;
//! }
//! ```

pub mod error;
pub mod hub;
pub mod pairing;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod storage;
pub mod supervisor;

pub use error::{Error, Result};
pub use hub::{BroadcastHub, Subscription};
pub use pairing::{LoginResponse, LoginStatus, PairingCoordinator};
pub use registry::SessionRegistry;
pub use session::{Event, EventPayload, Identity, Session};
pub use supervisor::{HubConfig, SendRequest, SessionSupervisor, StatusResponse};
