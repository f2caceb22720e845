use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::trace;

use super::MemStore;
use super::Record;
use super::State;
use crate::constants::DEFAULT_WATCH_BUFFER_SIZE;
use crate::store::modern::EventKind;
use crate::store::modern::KeyValue;
use crate::store::modern::ModernEvent;
use crate::store::modern::ModernKv;
use crate::store::modern::ModernWatchApi;
use crate::store::modern::RangeResult;
use crate::store::modern::WatchBatch;
use crate::store::modern::WatchChannel;
use crate::store::modern::WatchSender;
use crate::CallScope;
use crate::StoreError;
use crate::StoreResult;

#[async_trait]
impl ModernKv for MemStore {
    async fn range(
        &self,
        scope: &CallScope,
        key: &[u8],
    ) -> StoreResult<RangeResult> {
        if scope.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let key = String::from_utf8_lossy(key);
        let state = self.state.read();
        let kvs: Vec<KeyValue> = state
            .entries
            .get(key.as_ref())
            .map(|entry| KeyValue {
                key: key.as_bytes().to_vec(),
                value: entry.value.as_bytes().to_vec(),
                create_revision: entry.create_revision,
                mod_revision: entry.mod_revision,
                version: entry.version,
            })
            .into_iter()
            .collect();

        Ok(RangeResult {
            count: kvs.len() as i64,
            kvs,
            revision: state.revision,
        })
    }
}

#[async_trait]
impl ModernWatchApi for MemStore {
    async fn watch(
        &self,
        scope: &CallScope,
        prefix: &str,
    ) -> StoreResult<WatchChannel> {
        if scope.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        let (cursor, closer) = {
            let mut state = self.state.write();
            state.opened += 1;
            (state.revision, state.closer.clone())
        };
        trace!(prefix, cursor, "mem watch channel opened");

        let (sender, channel) = WatchChannel::bounded(DEFAULT_WATCH_BUFFER_SIZE);
        tokio::spawn(forward_batches(
            self.state.clone(),
            self.changes.subscribe(),
            prefix.to_string(),
            cursor,
            sender,
            scope.token().clone(),
            closer,
        ));
        Ok(channel)
    }
}

/// Sends one batch per committed revision touching `prefix`
async fn forward_batches(
    state: Arc<RwLock<State>>,
    mut changes: watch::Receiver<i64>,
    prefix: String,
    mut cursor: i64,
    sender: WatchSender,
    scope: CancellationToken,
    closer: CancellationToken,
) {
    loop {
        changes.borrow_and_update();
        let batches = match collect_batches(&state, &prefix, &mut cursor) {
            Ok(batches) => batches,
            Err(e) => {
                debug!(%prefix, cursor, error = %e, "mem watch fell behind retained history");
                let _ = sender.send(Err(e)).await;
                return;
            }
        };
        for batch in batches {
            if sender.send(Ok(batch)).await.is_err() {
                return;
            }
        }

        tokio::select! {
            biased;
            _ = scope.cancelled() => return,
            _ = closer.cancelled() => {
                debug!(%prefix, "mem watch channel closed by store");
                return;
            }
            _ = sender.closed() => return,
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

fn collect_batches(
    state: &RwLock<State>,
    prefix: &str,
    cursor: &mut i64,
) -> StoreResult<Vec<WatchBatch>> {
    let state = state.read();
    if *cursor < state.compacted_revision {
        return Err(StoreError::WatchCanceled {
            prefix: prefix.to_string(),
            reason: format!(
                "required revision {} has been compacted (compacted up to {})",
                *cursor + 1,
                state.compacted_revision
            ),
        });
    }
    let start = state.history.partition_point(|r| r.revision <= *cursor);

    let mut batches: Vec<WatchBatch> = Vec::new();
    for record in state.history.range(start..).filter(|r| r.key.starts_with(prefix)) {
        let event = into_event(record);
        match batches.last_mut() {
            Some(batch) if batch.revision == record.revision => batch.events.push(event),
            _ => batches.push(WatchBatch::new(record.revision, vec![event])),
        }
    }
    *cursor = state.revision;
    Ok(batches)
}

fn into_event(record: &Record) -> ModernEvent {
    let kind = if record.action.is_removal() {
        EventKind::Delete
    } else {
        EventKind::Put
    };
    ModernEvent {
        kind,
        kv: KeyValue {
            mod_revision: record.revision,
            ..KeyValue::new(record.key.as_bytes(), record.value.as_bytes())
        },
    }
}
