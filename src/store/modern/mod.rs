//! Modern (streaming) store generation
//!
//! Reads return a result set that is simply empty for an absent key. Watches
//! deliver events in batches through a [`WatchChannel`]; the watch adapter
//! drains one batch across several `next` calls and reopens the channel when it
//! yields an empty batch.
//!
//! Transport implementations:
//! - [`GrpcStore`]: tonic client for the store's v3 gRPC services
//! - [`crate::MemStore`]: in-process store for tests and embedding

mod grpc;
mod read;
mod watch;

pub use grpc::*;
pub use read::*;
pub use watch::*;

#[cfg(test)]
mod read_test;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tonic::async_trait;

use crate::CallScope;
use crate::StoreResult;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
    pub create_revision: i64,
    pub mod_revision: i64,
    pub version: i64,
}

impl KeyValue {
    pub fn new(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            ..Default::default()
        }
    }
}

/// Result set of a point read
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RangeResult {
    pub kvs: Vec<KeyValue>,
    /// Number of keys in range; 0 when the key is absent
    pub count: i64,
    /// Store revision the read was served at
    pub revision: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Put,
    /// Explicit delete or lease expiry
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModernEvent {
    pub kind: EventKind,
    pub kv: KeyValue,
}

impl ModernEvent {
    pub fn put(
        key: impl Into<Vec<u8>>,
        value: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            kind: EventKind::Put,
            kv: KeyValue::new(key, value),
        }
    }

    pub fn delete(key: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: EventKind::Delete,
            kv: KeyValue::new(key, Vec::new()),
        }
    }
}

/// Events delivered together by one watch response, in store order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WatchBatch {
    pub revision: i64,
    pub events: Vec<ModernEvent>,
}

impl WatchBatch {
    pub fn new(
        revision: i64,
        events: Vec<ModernEvent>,
    ) -> Self {
        Self { revision, events }
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Sending half of a [`WatchChannel`], owned by the transport
pub type WatchSender = mpsc::Sender<StoreResult<WatchBatch>>;

/// Batches of one open watch, as produced by a transport
#[derive(Debug)]
pub struct WatchChannel {
    rx: mpsc::Receiver<StoreResult<WatchBatch>>,
}

impl WatchChannel {
    pub fn new(rx: mpsc::Receiver<StoreResult<WatchBatch>>) -> Self {
        Self { rx }
    }

    /// Bounded channel pair for transport implementations
    pub fn bounded(buffer: usize) -> (WatchSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self::new(rx))
    }

    /// Next batch; a closed channel yields an empty batch
    pub async fn recv(&mut self) -> StoreResult<WatchBatch> {
        match self.rx.recv().await {
            Some(batch) => batch,
            None => Ok(WatchBatch::default()),
        }
    }
}

/// Point reads of the modern generation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModernKv: Send + Sync {
    /// Reads exactly `key` (no range end)
    async fn range(
        &self,
        scope: &CallScope,
        key: &[u8],
    ) -> StoreResult<RangeResult>;
}

/// Prefix watches of the modern generation
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ModernWatchApi: Send + Sync {
    /// Opens a channel carrying every change under `prefix`
    ///
    /// The channel stays open until `scope` is cancelled, the receiver is
    /// dropped, or the store ends the watch.
    async fn watch(
        &self,
        scope: &CallScope,
        prefix: &str,
    ) -> StoreResult<WatchChannel>;
}
