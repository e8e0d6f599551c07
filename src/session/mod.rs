//! Session handling
//!
//! A session is one authenticated account connection. This module contains
//! the session handle itself, the normalised [`Event`] model, and the
//! [`EventBridge`] that turns protocol events into hub events.

pub mod bridge;
pub mod event;
pub mod handle;
pub mod identity;
pub mod normalize;

pub use bridge::EventBridge;
pub use event::{Event, EventPayload, MediaKind};
pub use handle::Session;
pub use identity::Identity;
