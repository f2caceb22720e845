use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tonic::async_trait;
use tracing::debug;
use tracing::trace;
use tracing::warn;

use super::EventKind;
use super::ModernEvent;
use super::ModernWatchApi;
use super::WatchBatch;
use super::WatchChannel;
use crate::constants::REOPEN_WARN_INTERVAL;
use crate::scope::WatchScopes;
use crate::CallScope;
use crate::KeyChange;
use crate::KeyWatcher;
use crate::ScopeGuard;
use crate::StoreError;
use crate::StoreResult;

/// An open transport channel and the scope that keeps it alive
///
/// Dropping it cancels the channel scope, which tells the transport to stop
/// forwarding.
struct OpenChannel {
    channel: WatchChannel,
    _scope: ScopeGuard,
}

/// Recursive prefix watch over the modern generation
///
/// The channel is opened lazily on the first `next` call. Each received batch
/// is buffered and handed out one event per call; a new batch is only read
/// once the buffer is drained. A channel that closes or yields an empty batch
/// is replaced and the call keeps waiting; only a real event, a channel error or
/// the per-call scope ends it.
pub struct ModernKeyWatcher {
    api: Arc<dyn ModernWatchApi>,
    prefix: String,
    scopes: WatchScopes,
    channel: Option<OpenChannel>,
    pending: VecDeque<ModernEvent>,
}

impl ModernKeyWatcher {
    pub fn new(
        api: Arc<dyn ModernWatchApi>,
        prefix: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            api,
            prefix: prefix.to_string(),
            scopes: WatchScopes::new(timeout),
            channel: None,
            pending: VecDeque::new(),
        }
    }

    /// Per-call bound; zero means unbounded
    pub fn timeout(&self) -> Duration {
        self.scopes.timeout()
    }

    /// Events received but not yet returned by `next`
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    pub fn is_channel_open(&self) -> bool {
        self.channel.is_some()
    }

    /// Reads one batch, opening the channel first if needed
    async fn next_batch(
        &mut self,
        scope: &CallScope,
    ) -> StoreResult<WatchBatch> {
        if self.channel.is_none() {
            let channel_scope = CallScope::unbounded();
            let guard = channel_scope.guard();
            let channel = scope.run(self.api.watch(&channel_scope, &self.prefix)).await?;
            debug!(prefix = %self.prefix, "modern watch channel opened");
            self.channel = Some(OpenChannel {
                channel,
                _scope: guard,
            });
        }
        let Some(open) = self.channel.as_mut() else {
            return Err(StoreError::ChannelClosed(self.prefix.clone()));
        };

        match scope.run(open.channel.recv()).await {
            Ok(batch) => Ok(batch),
            Err(e @ (StoreError::DeadlineExceeded(_) | StoreError::Cancelled)) => Err(e),
            Err(e) => {
                warn!(prefix = %self.prefix, error = %e, "modern watch channel failed");
                self.channel = None;
                Err(e)
            }
        }
    }
}

#[async_trait]
impl KeyWatcher for ModernKeyWatcher {
    async fn next(&mut self) -> StoreResult<KeyChange> {
        let (scope, _guard) = self.scopes.acquire();
        let mut degenerate = 0;

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(into_change(event));
            }

            let batch = self.next_batch(&scope).await?;
            if batch.is_empty() {
                // Closed or spurious: a fresh channel is opened on the next pass.
                self.channel = None;
                degenerate += 1;
                if degenerate % REOPEN_WARN_INTERVAL == 0 {
                    warn!(prefix = %self.prefix, degenerate, "watch channel keeps closing without events");
                } else {
                    trace!(prefix = %self.prefix, degenerate, "empty watch batch");
                }
                scope.ensure_live()?;
                tokio::task::yield_now().await;
                continue;
            }

            trace!(
                prefix = %self.prefix,
                revision = batch.revision,
                events = batch.events.len(),
                "modern watch batch"
            );
            self.pending.extend(batch.events);
        }
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn into_change(event: ModernEvent) -> KeyChange {
    let key = String::from_utf8_lossy(&event.kv.key).into_owned();
    match event.kind {
        EventKind::Delete => KeyChange::removed(key),
        EventKind::Put => KeyChange {
            key,
            value: Some(String::from_utf8_lossy(&event.kv.value).into_owned()),
        },
    }
}
