//! Attached event handlers
//!
//! Tracks which identities already have a bridge task forwarding their
//! events into the hub. Attachment is attach-if-absent: the spawn closure
//! runs at most once per identity until the handler is detached.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::session::Identity;

#[derive(Debug, Default)]
pub(super) struct HandlerSet {
    handlers: Mutex<HashMap<Identity, JoinHandle<()>>>,
}

impl HandlerSet {
    /// Spawn and record a handler unless one is already attached
    pub(super) fn attach<F>(&self, identity: &Identity, spawn: F) -> bool
    where
        F: FnOnce() -> Option<JoinHandle<()>>,
    {
        let mut handlers = self.handlers.lock();

        // A finished handler (event stream ended) still counts as attached
        if handlers.contains_key(identity) {
            return false;
        }

        match spawn() {
            Some(handle) => {
                handlers.insert(identity.clone(), handle);
                true
            }
            None => false,
        }
    }

    /// Abort and forget the handler of `identity`
    pub(super) fn detach(&self, identity: &Identity) -> bool {
        let removed = self.handlers.lock().remove(identity);
        match removed {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(super) fn contains(&self, identity: &Identity) -> bool {
        self.handlers.lock().contains_key(identity)
    }

    pub(super) fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    /// Abort every handler
    pub(super) fn abort_all(&self) {
        for (_, handle) in self.handlers.lock().drain() {
            handle.abort();
        }
    }
}
