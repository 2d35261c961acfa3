//! Idempotency lock: at most one in-flight workflow per trigger key.
//!
//! Purely in-memory: a restart drops every pending claim. A claim leaked by
//! a crashed workflow is only cleared by that restart.

use std::collections::HashSet;
use std::sync::Mutex;

/// Set of trigger keys whose workflows are currently in flight.
#[derive(Debug, Default)]
pub struct IdempotencyLock {
    pending: Mutex<HashSet<String>>,
}

impl IdempotencyLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `key` if nobody holds it. Never blocks.
    pub fn try_claim(&self, key: &str) -> bool {
        self.try_claim_unless(key, |_| false)
    }

    /// Claim `key` unless it is pending or `is_completed(key)` says a
    /// finished workflow already owns it. Check and insert happen under
    /// one guard.
    pub fn try_claim_unless(&self, key: &str, is_completed: impl FnOnce(&str) -> bool) -> bool {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        if pending.contains(key) || is_completed(key) {
            return false;
        }
        pending.insert(key.to_string());
        true
    }

    /// Drop a claim. Releasing an unknown key is a no-op.
    pub fn release(&self, key: &str) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn is_pending(&self, key: &str) -> bool {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
