use std::time::Duration;

/// Upper bound of every point read round trip
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Consecutive channel reopens within one modern `next` call between warnings
pub(crate) const REOPEN_WARN_INTERVAL: u32 = 64;

/// Batches buffered between a transport watch stream and its adapter
pub(crate) const DEFAULT_WATCH_BUFFER_SIZE: usize = 16;

/// Mutations a `MemStore` keeps for watchers that fall behind
pub(crate) const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// Environment prefix for configuration overrides (`KEYWATCH__WATCH__TIMEOUT_MS`)
pub(crate) const CONFIG_ENV_PREFIX: &str = "KEYWATCH";

/// gRPC method paths of the modern generation
pub(crate) const RANGE_PATH: &str = "/etcdserverpb.KV/Range";
pub(crate) const WATCH_PATH: &str = "/etcdserverpb.Watch/Watch";
