use std::time::Duration;

use super::bounded_scope;
use super::CallScope;
use super::ScopeGuard;

/// Per-call cancellation bookkeeping shared by both watch adapters
///
/// A deadline scope is only created when the configured timeout is positive.
/// With a zero timeout the call waits indefinitely and there is no cancel
/// handle to track.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WatchScopes {
    timeout: Duration,
}

impl WatchScopes {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn acquire(&self) -> (CallScope, ScopeGuard) {
        if self.timeout.is_zero() {
            (CallScope::unbounded(), ScopeGuard::inert())
        } else {
            bounded_scope(self.timeout)
        }
    }
}
