//! Generation-agnostic access to a hierarchical key-value coordination store.
//!
//! A storage engine needs two things from the store: point reads of individual
//! keys and a stream of changes under a handful of prefixes. The store exposes
//! them through two incompatible client generations (a legacy long-poll API and
//! a modern streaming gRPC API). This crate hides both behind [`ReadApi`] and
//! [`KeyWatcher`]:
//!
//! - every read runs in a fresh [`CallScope`] bounded at 60s, and an absent key is
//!   `Ok(None)`, never an error
//! - a watch yields exactly one [`KeyChange`] per `next` call; deletions and
//!   expiries carry no value
//! - a modern watch buffers each batch and transparently reopens its channel
//!   when the store closes it
//!
//! ```ignore
//! let config = StoreConfig::new()?.validate()?;
//! let backend = Backend::connect(&config).await?;
//!
//! let mut watcher = backend.key_watcher("/data", &config.watch);
//! let handle = spawn_watch_loop(watcher, change_tx, shutdown_rx);
//! ```

mod config;
mod constants;
mod errors;
mod mem;
mod scope;
mod scoped_timer;
pub mod store;
mod watch_loop;

pub use self::config::*;
pub use errors::*;
pub use mem::*;
pub use scope::CallScope;
pub use scope::ScopeGuard;
pub use store::legacy::HttpKeysApi;
pub use store::modern::GrpcStore;
pub use store::Backend;
pub use store::Generation;
pub use store::KeyChange;
pub use store::KeyWatcher;
pub use store::ReadApi;
pub use watch_loop::*;

#[cfg(test)]
mod watch_loop_test;
