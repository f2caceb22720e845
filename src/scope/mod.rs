//! Call scopes: cancellable, optionally deadline-bounded contexts for one store call.
//!
//! A [`CallScope`] is handed to every transport call and also enforced around it
//! by the adapters, so a transport that ignores the scope is still bounded. The
//! matching [`ScopeGuard`] is the release half: it cancels the scope when the
//! call returns unless the call disarmed it first.
//!
//! Two helpers build scopes for the adapters:
//! - [`read_scope`]: fixed 60s bound used by every point read
//! - [`WatchScopes`]: per-call bookkeeping for watches, unbounded when the
//!   configured timeout is zero

mod read;
mod watch;

pub(crate) use read::*;
pub(crate) use watch::*;

#[cfg(test)]
mod scope_test;

use std::future::Future;
use std::time::Duration;

use futures::future;
use futures::future::Either;
use tokio::time::sleep_until;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::StoreError;
use crate::StoreResult;

#[derive(Debug, Clone)]
pub struct CallScope {
    token: CancellationToken,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl CallScope {
    /// Scope that only ends when cancelled
    pub fn unbounded() -> Self {
        Self {
            token: CancellationToken::new(),
            timeout: None,
            deadline: None,
        }
    }

    /// Scope whose deadline is `timeout` from now
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            token: CancellationToken::new(),
            timeout: Some(timeout),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// Release handle that cancels this scope when dropped
    pub fn guard(&self) -> ScopeGuard {
        ScopeGuard {
            handle: Some(self.token.clone()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` for unbounded scopes
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails if the scope was cancelled or its deadline already passed
    pub fn ensure_live(&self) -> StoreResult<()> {
        if self.token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(StoreError::DeadlineExceeded(self.timeout.unwrap_or_default()))
            }
            _ => Ok(()),
        }
    }

    /// Drives `fut` unless the scope is cancelled or its deadline passes first.
    ///
    /// A result that is ready at the same time as the deadline wins.
    pub async fn run<F, T>(
        &self,
        fut: F,
    ) -> StoreResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        if self.token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let deadline = match self.deadline {
            Some(deadline) => Either::Left(sleep_until(deadline)),
            None => Either::Right(future::pending::<()>()),
        };

        tokio::select! {
            biased;
            res = fut => res,
            _ = self.token.cancelled() => Err(StoreError::Cancelled),
            _ = deadline => Err(StoreError::DeadlineExceeded(self.timeout.unwrap_or_default())),
        }
    }
}

/// Release half of a [`CallScope`]
///
/// Invokes the cancel handle at most once: on [`release`](Self::release) or on
/// drop, whichever comes first. [`disarm`](Self::disarm) forgets the handle
/// without cancelling.
#[must_use = "dropping the guard releases the scope immediately"]
#[derive(Debug)]
pub struct ScopeGuard {
    handle: Option<CancellationToken>,
}

impl ScopeGuard {
    /// Guard with nothing to release (unbounded watch calls)
    pub(crate) fn inert() -> Self {
        Self { handle: None }
    }

    /// Whether a cancel handle is still outstanding
    pub fn is_armed(&self) -> bool {
        self.handle.is_some()
    }

    /// Clears the outstanding handle without invoking it
    pub fn disarm(&mut self) {
        self.handle = None;
    }

    /// Cancels the scope if a handle is outstanding; later calls are no-ops
    pub fn release(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.cancel();
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        self.release();
    }
}
