//! In-memory store serving both generations
//!
//! One shared state backs the legacy keys API and the modern KV/watch APIs, so
//! the same scenario can be replayed against either adapter pair. Every write
//! bumps the revision and wakes watchers through a `tokio::sync::watch`
//! notifier.
//!
//! Semantics follow the store closely enough for adapter tests:
//! - each mutation gets its own legacy index; a transaction shares one revision
//! - legacy reads of a strict path prefix return a directory node
//! - legacy watches are directory scoped, modern watches are byte-prefix scoped
//! - only the most recent mutations are kept; a watcher that falls behind them
//!   fails the way the store reports a cleared index or a compacted revision

mod legacy;
mod modern;

pub use legacy::MemLegacyWatcher;


use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::trace;

use crate::constants::DEFAULT_HISTORY_LIMIT;
use crate::store::legacy::LegacyAction;

/// One operation of a [`MemStore::txn`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxnOp {
    Put { key: String, value: String },
    Delete { key: String },
}

impl TxnOp {
    pub fn put(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        TxnOp::Put {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        TxnOp::Delete { key: key.into() }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    create_revision: i64,
    mod_revision: i64,
    version: i64,
    /// Legacy index of the last modification
    modified_index: u64,
}

/// A committed mutation, kept for watchers
#[derive(Debug, Clone)]
struct Record {
    index: u64,
    revision: i64,
    action: LegacyAction,
    key: String,
    /// Empty for removals
    value: String,
    prev: Option<Entry>,
}

#[derive(Debug)]
struct State {
    entries: BTreeMap<String, Entry>,
    revision: i64,
    index: u64,
    history: VecDeque<Record>,
    history_limit: usize,
    /// Index and revision of the newest record dropped from `history`
    compacted_index: u64,
    compacted_revision: i64,
    /// Cancelled by `close_watch_channels`, then replaced
    closer: CancellationToken,
    opened: usize,
}

impl State {
    fn new(history_limit: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            revision: 1,
            index: 0,
            history: VecDeque::new(),
            history_limit,
            compacted_index: 0,
            compacted_revision: 0,
            closer: CancellationToken::new(),
            opened: 0,
        }
    }

    /// True when `key` is a strict path prefix of a stored key
    fn is_dir(
        &self,
        key: &str,
    ) -> bool {
        let dir = dir_prefix(key);
        self.entries
            .range(dir.clone()..)
            .next()
            .is_some_and(|(k, _)| k.starts_with(&dir))
    }

    fn trim_history(&mut self) {
        let excess = self.history.len().saturating_sub(self.history_limit);
        let newest_dropped = self.history.drain(..excess).last();
        if let Some(record) = newest_dropped {
            self.compacted_index = record.index;
            self.compacted_revision = record.revision;
            trace!(index = record.index, revision = record.revision, "mem store history trimmed");
        }
    }
}

enum Mutation {
    Put { key: String, value: String },
    Remove { key: String, action: LegacyAction },
}

/// Shared in-memory store; clones share state
#[derive(Debug, Clone)]
pub struct MemStore {
    state: Arc<RwLock<State>>,
    changes: Arc<watch::Sender<i64>>,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self::with_history_limit(DEFAULT_HISTORY_LIMIT)
    }

    /// Store that keeps at most `limit` mutations for watchers
    pub fn with_history_limit(limit: usize) -> Self {
        let state = State::new(limit.max(1));
        let (changes, _) = watch::channel(state.revision);
        Self {
            state: Arc::new(RwLock::new(state)),
            changes: Arc::new(changes),
        }
    }

    /// Writes `value` under `key` and returns the new revision
    pub fn put(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> i64 {
        self.txn(vec![TxnOp::put(key, value)])
    }

    /// Removes `key`; `None` when it did not exist
    pub fn delete(
        &self,
        key: &str,
    ) -> Option<i64> {
        self.apply(vec![Mutation::Remove {
            key: key.to_string(),
            action: LegacyAction::Delete,
        }])
    }

    /// Removes `key` the way a TTL expiry does
    pub fn expire(
        &self,
        key: &str,
    ) -> Option<i64> {
        self.apply(vec![Mutation::Remove {
            key: key.to_string(),
            action: LegacyAction::Expire,
        }])
    }

    /// Applies `ops` atomically under one revision
    ///
    /// Deletes of absent keys are skipped. Returns the current revision when
    /// nothing changed.
    pub fn txn(
        &self,
        ops: Vec<TxnOp>,
    ) -> i64 {
        let mutations = ops
            .into_iter()
            .map(|op| match op {
                TxnOp::Put { key, value } => Mutation::Put { key, value },
                TxnOp::Delete { key } => Mutation::Remove {
                    key,
                    action: LegacyAction::Delete,
                },
            })
            .collect();
        self.apply(mutations).unwrap_or_else(|| self.revision())
    }

    pub fn revision(&self) -> i64 {
        self.state.read().revision
    }

    /// Closes every open modern watch channel, as a server restart would
    pub fn close_watch_channels(&self) {
        let closer = {
            let mut state = self.state.write();
            std::mem::replace(&mut state.closer, CancellationToken::new())
        };
        debug!("closing mem store watch channels");
        closer.cancel();
    }

    /// Modern watch channels opened so far
    pub fn open_watch_channels(&self) -> usize {
        self.state.read().opened
    }

    fn apply(
        &self,
        mutations: Vec<Mutation>,
    ) -> Option<i64> {
        let revision = {
            let mut state = self.state.write();
            let revision = state.revision + 1;
            let mut applied = 0;

            for mutation in mutations {
                let record = match mutation {
                    Mutation::Put { key, value } => {
                        state.index += 1;
                        let index = state.index;
                        let prev = state.entries.get(&key).cloned();
                        let action = if prev.is_some() {
                            LegacyAction::Set
                        } else {
                            LegacyAction::Create
                        };
                        let entry = Entry {
                            value: value.clone(),
                            create_revision: prev.as_ref().map_or(revision, |p| p.create_revision),
                            mod_revision: revision,
                            version: prev.as_ref().map_or(1, |p| p.version + 1),
                            modified_index: index,
                        };
                        state.entries.insert(key.clone(), entry);
                        Record {
                            index,
                            revision,
                            action,
                            key,
                            value,
                            prev,
                        }
                    }
                    Mutation::Remove { key, action } => {
                        let Some(prev) = state.entries.remove(&key) else {
                            trace!(key, "remove of absent key skipped");
                            continue;
                        };
                        state.index += 1;
                        Record {
                            index: state.index,
                            revision,
                            action,
                            key,
                            value: String::new(),
                            prev: Some(prev),
                        }
                    }
                };
                state.history.push_back(record);
                applied += 1;
            }

            if applied == 0 {
                return None;
            }
            state.revision = revision;
            state.trim_history();
            revision
        };

        trace!(revision, "mem store commit");
        self.changes.send_replace(revision);
        Some(revision)
    }
}

/// `/data` and `/data/` both cover `/data/...`; the root covers everything
fn dir_prefix(key: &str) -> String {
    format!("{}/", key.trim_end_matches('/'))
}
