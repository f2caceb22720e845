//! Legacy (HTTP long-poll) store generation
//!
//! The transport seam is [`LegacyKeysApi`] plus the [`LegacyWatcher`] it hands
//! out. Each watcher response carries exactly one node change, so the watch
//! adapter needs no buffering. Errors come back as structured [`LegacyError`]
//! bodies with a numeric code; "key not found" (100) is how this generation
//! reports an absent key.
//!
//! Transport implementations:
//! - [`HttpKeysApi`]: HTTP client for the store's v2 keys API
//! - [`crate::MemStore`]: in-process store for tests and embedding

mod http;
mod read;
mod watch;

pub use http::*;
pub use read::*;
pub use watch::*;

#[cfg(test)]
mod watch_test;

use std::fmt;

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::CallScope;
use crate::StoreResult;

/// Numeric error codes of the legacy keys API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LegacyErrorCode {
    KeyNotFound,
    TestFailed,
    NotFile,
    NotDir,
    NodeExist,
    RootReadOnly,
    DirNotEmpty,
    Unauthorized,
    RaftInternal,
    LeaderElect,
    WatcherCleared,
    EventIndexCleared,
    Other(u32),
}

impl LegacyErrorCode {
    pub fn from_code(code: u32) -> Self {
        match code {
            100 => Self::KeyNotFound,
            101 => Self::TestFailed,
            102 => Self::NotFile,
            104 => Self::NotDir,
            105 => Self::NodeExist,
            107 => Self::RootReadOnly,
            108 => Self::DirNotEmpty,
            110 => Self::Unauthorized,
            300 => Self::RaftInternal,
            301 => Self::LeaderElect,
            400 => Self::WatcherCleared,
            401 => Self::EventIndexCleared,
            other => Self::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::KeyNotFound => 100,
            Self::TestFailed => 101,
            Self::NotFile => 102,
            Self::NotDir => 104,
            Self::NodeExist => 105,
            Self::RootReadOnly => 107,
            Self::DirNotEmpty => 108,
            Self::Unauthorized => 110,
            Self::RaftInternal => 300,
            Self::LeaderElect => 301,
            Self::WatcherCleared => 400,
            Self::EventIndexCleared => 401,
            Self::Other(code) => *code,
        }
    }
}

impl fmt::Display for LegacyErrorCode {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error body returned by the legacy keys API
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message} ({cause}) [{index}]")]
pub struct LegacyError {
    pub code: LegacyErrorCode,
    pub message: String,
    /// Usually the key the request was about
    pub cause: String,
    /// Store index at the time of the error
    pub index: u64,
}

impl LegacyError {
    pub fn new(
        code: LegacyErrorCode,
        message: impl Into<String>,
        cause: impl Into<String>,
        index: u64,
    ) -> Self {
        Self {
            code,
            message: message.into(),
            cause: cause.into(),
            index,
        }
    }

    pub fn key_not_found(
        key: &str,
        index: u64,
    ) -> Self {
        Self::new(LegacyErrorCode::KeyNotFound, "Key not found", key, index)
    }
}

/// Action that produced a legacy response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegacyAction {
    Get,
    Set,
    Create,
    Update,
    Delete,
    Expire,
    CompareAndSwap,
    CompareAndDelete,
}

impl LegacyAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Expire => "expire",
            Self::CompareAndSwap => "compareAndSwap",
            Self::CompareAndDelete => "compareAndDelete",
        }
    }

    /// Parses the wire name of an action
    pub fn parse(action: &str) -> Option<Self> {
        let action = match action {
            "get" => Self::Get,
            "set" => Self::Set,
            "create" => Self::Create,
            "update" => Self::Update,
            "delete" => Self::Delete,
            "expire" => Self::Expire,
            "compareAndSwap" => Self::CompareAndSwap,
            "compareAndDelete" => Self::CompareAndDelete,
            _ => return None,
        };
        Some(action)
    }

    /// Whether the node no longer exists after this action
    pub fn is_removal(&self) -> bool {
        matches!(self, Self::Delete | Self::Expire | Self::CompareAndDelete)
    }
}

impl fmt::Display for LegacyAction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LegacyNode {
    pub key: String,
    /// Empty for directories and removed nodes
    pub value: String,
    pub dir: bool,
    pub modified_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyResponse {
    pub action: LegacyAction,
    pub node: LegacyNode,
    pub prev_node: Option<LegacyNode>,
    /// Store index at response time
    pub index: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    pub recursive: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatcherOptions {
    /// Deliver events strictly after this index; 0 means "from now"
    pub after_index: u64,
    pub recursive: bool,
}

/// Legacy keys API client
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LegacyKeysApi: Send + Sync {
    async fn get(
        &self,
        scope: &CallScope,
        key: &str,
        opts: GetOptions,
    ) -> StoreResult<LegacyResponse>;

    /// Creates a watcher on `key`; no request is issued until its first `next`
    fn watcher(
        &self,
        key: &str,
        opts: WatcherOptions,
    ) -> Box<dyn LegacyWatcher>;
}

/// Long-poll subscription handed out by [`LegacyKeysApi::watcher`]
#[cfg_attr(test, automock)]
#[async_trait]
pub trait LegacyWatcher: Send {
    /// Waits for the next change; one response per call
    async fn next(
        &mut self,
        scope: &CallScope,
    ) -> StoreResult<LegacyResponse>;
}
