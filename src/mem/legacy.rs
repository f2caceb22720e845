use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tonic::async_trait;
use tracing::trace;

use super::dir_prefix;
use super::MemStore;
use super::Record;
use super::State;
use crate::store::legacy::GetOptions;
use crate::store::legacy::LegacyAction;
use crate::store::legacy::LegacyError;
use crate::store::legacy::LegacyErrorCode;
use crate::store::legacy::LegacyKeysApi;
use crate::store::legacy::LegacyNode;
use crate::store::legacy::LegacyResponse;
use crate::store::legacy::LegacyWatcher;
use crate::store::legacy::WatcherOptions;
use crate::CallScope;
use crate::StoreError;
use crate::StoreResult;

#[async_trait]
impl LegacyKeysApi for MemStore {
    async fn get(
        &self,
        scope: &CallScope,
        key: &str,
        _opts: GetOptions,
    ) -> StoreResult<LegacyResponse> {
        if scope.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let state = self.state.read();
        let node = match state.entries.get(key) {
            Some(entry) => LegacyNode {
                key: key.to_string(),
                value: entry.value.clone(),
                dir: false,
                modified_index: entry.modified_index,
            },
            None if state.is_dir(key) => LegacyNode {
                key: key.to_string(),
                dir: true,
                ..Default::default()
            },
            None => return Err(LegacyError::key_not_found(key, state.index).into()),
        };

        Ok(LegacyResponse {
            action: LegacyAction::Get,
            node,
            prev_node: None,
            index: state.index,
        })
    }

    fn watcher(
        &self,
        key: &str,
        opts: WatcherOptions,
    ) -> Box<dyn LegacyWatcher> {
        let cursor = match opts.after_index {
            0 => self.state.read().index,
            after => after,
        };
        trace!(key, cursor, recursive = opts.recursive, "mem legacy watcher");

        Box::new(MemLegacyWatcher {
            state: self.state.clone(),
            changes: self.changes.subscribe(),
            key: key.trim_end_matches('/').to_string(),
            dir: dir_prefix(key),
            recursive: opts.recursive,
            cursor,
        })
    }
}

/// Long-poll watcher over a [`MemStore`]
///
/// Delivers one change per call, in index order, starting after `cursor`.
pub struct MemLegacyWatcher {
    state: Arc<RwLock<State>>,
    changes: watch::Receiver<i64>,
    key: String,
    dir: String,
    recursive: bool,
    cursor: u64,
}

impl MemLegacyWatcher {
    fn covers(
        &self,
        key: &str,
    ) -> bool {
        key == self.key || (self.recursive && key.starts_with(&self.dir))
    }

    /// Next matching change after the cursor, advancing past skipped records
    fn poll(&mut self) -> StoreResult<Option<LegacyResponse>> {
        let state = self.state.read();
        if self.cursor < state.compacted_index {
            return Err(LegacyError::new(
                LegacyErrorCode::EventIndexCleared,
                "The event in requested index is outdated and cleared",
                format!(
                    "the requested history has been cleared [{}/{}]",
                    state.compacted_index + 1,
                    self.cursor + 1
                ),
                state.index,
            )
            .into());
        }

        let start = state.history.partition_point(|r| r.index <= self.cursor);
        let found = state.history.range(start..).find(|r| self.covers(&r.key)).map(into_response);
        self.cursor = match &found {
            Some(response) => response.index,
            None => state.index,
        };
        Ok(found)
    }
}

#[async_trait]
impl LegacyWatcher for MemLegacyWatcher {
    async fn next(
        &mut self,
        scope: &CallScope,
    ) -> StoreResult<LegacyResponse> {
        loop {
            self.changes.borrow_and_update();
            if let Some(response) = self.poll()? {
                return Ok(response);
            }

            tokio::select! {
                biased;
                _ = scope.token().cancelled() => return Err(StoreError::Cancelled),
                changed = self.changes.changed() => {
                    changed.map_err(|_| StoreError::ChannelClosed("mem store dropped".to_string()))?;
                }
            }
        }
    }
}

fn into_response(record: &Record) -> LegacyResponse {
    LegacyResponse {
        action: record.action,
        node: LegacyNode {
            key: record.key.clone(),
            value: record.value.clone(),
            dir: false,
            modified_index: record.index,
        },
        prev_node: record.prev.as_ref().map(|prev| LegacyNode {
            key: record.key.clone(),
            value: prev.value.clone(),
            dir: false,
            modified_index: prev.modified_index,
        }),
        index: record.index,
    }
}
