//! Session supervisor
//!
//! The supervisor composes the registry, the hub and the pairing
//! coordinator. It restores persisted sessions at startup, disconnects them
//! at shutdown, and implements the operations exposed to transports.

pub mod config;
pub mod lifecycle;
pub mod service;

pub use config::HubConfig;
pub use lifecycle::{SessionSupervisor, StartupReport};
pub use service::{DeviceInfo, SendRequest, StatusResponse};
