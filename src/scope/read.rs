use std::time::Duration;

use super::CallScope;
use super::ScopeGuard;
use crate::constants::READ_TIMEOUT;

/// Fresh scope for one point read, bounded by [`READ_TIMEOUT`]
pub(crate) fn read_scope() -> (CallScope, ScopeGuard) {
    bounded_scope(READ_TIMEOUT)
}

pub(crate) fn bounded_scope(timeout: Duration) -> (CallScope, ScopeGuard) {
    let scope = CallScope::with_timeout(timeout);
    let guard = scope.guard();
    (scope, guard)
}
