use std::time::Duration;

use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use super::LegacyKeysApi;
use super::LegacyResponse;
use super::LegacyWatcher;
use super::WatcherOptions;
use crate::scope::WatchScopes;
use crate::KeyChange;
use crate::KeyWatcher;
use crate::StoreResult;

/// Recursive prefix watch over the legacy keys API
///
/// The subscription is opened once at construction and reused by every
/// `next` call until the transport fails.
pub struct LegacyKeyWatcher {
    prefix: String,
    scopes: WatchScopes,
    watcher: Box<dyn LegacyWatcher>,
}

impl LegacyKeyWatcher {
    pub fn new(
        keys: &dyn LegacyKeysApi,
        prefix: &str,
        timeout: Duration,
    ) -> Self {
        let watcher = keys.watcher(
            prefix,
            WatcherOptions {
                after_index: 0,
                recursive: true,
            },
        );
        debug!(prefix, ?timeout, "legacy watcher opened");

        Self {
            prefix: prefix.to_string(),
            scopes: WatchScopes::new(timeout),
            watcher,
        }
    }

    /// Per-call bound; zero means unbounded
    pub fn timeout(&self) -> Duration {
        self.scopes.timeout()
    }
}

#[async_trait]
impl KeyWatcher for LegacyKeyWatcher {
    async fn next(&mut self) -> StoreResult<KeyChange> {
        let (scope, mut guard) = self.scopes.acquire();

        let response = scope.run(self.watcher.next(&scope)).await?;
        // The call completed; nothing left to cancel.
        guard.disarm();

        trace!(
            prefix = %self.prefix,
            key = %response.node.key,
            action = %response.action,
            "legacy watch event"
        );
        Ok(into_change(response))
    }

    fn prefix(&self) -> &str {
        &self.prefix
    }
}

fn into_change(response: LegacyResponse) -> KeyChange {
    let node = response.node;
    if response.action.is_removal() {
        KeyChange::removed(node.key)
    } else {
        KeyChange {
            key: node.key,
            value: Some(node.value),
        }
    }
}
