//! Error hierarchy for store access
//!
//! Two layers:
//! - [`StoreError`]: failure of a single read, watch or transport call. Adapters
//!   surface these unmodified; retry policy belongs to the caller.
//! - [`Error`]: crate-level failures, including configuration loading.
//!
//! An absent key is never an error. Adapters report it as `Ok(None)`.

use std::time::Duration;

use config::ConfigError;

use crate::store::legacy::LegacyError;
use crate::store::legacy::LegacyErrorCode;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

/// Result of a single store call
pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Read, watch or transport failure
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Configuration loading or validation failure
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The call scope's deadline passed before the store answered
    #[error("Deadline exceeded after {0:?}")]
    DeadlineExceeded(Duration),

    /// The call scope was cancelled by its owner
    #[error("Call cancelled")]
    Cancelled,

    /// Key or prefix rejected before reaching the store
    #[error("Invalid key: {0:?}")]
    InvalidKey(String),

    /// Error body returned by the legacy (long-poll) generation
    #[error(transparent)]
    Legacy(#[from] LegacyError),

    /// gRPC status returned by the modern generation
    #[error(transparent)]
    Rpc(#[from] Box<tonic::Status>),

    /// gRPC transport layer errors
    #[error(transparent)]
    Transport(#[from] Box<tonic::transport::Error>),

    /// HTTP transport errors of the legacy generation
    #[error(transparent)]
    Http(#[from] Box<reqwest::Error>),

    /// Legacy response body that is not valid JSON
    #[error(transparent)]
    Decode(#[from] serde_json::Error),

    /// Response the store should never send
    #[error("Unexpected store response: {0}")]
    UnexpectedResponse(String),

    /// Endpoint that is not a valid URL
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// None of the configured endpoints accepted a connection
    #[error("No reachable endpoint among {0:?}")]
    NoReachableEndpoint(Vec<String>),

    /// The store cancelled a watch on its side (compaction, auth, ...)
    #[error("Watch on {prefix} cancelled by store: {reason}")]
    WatchCanceled { prefix: String, reason: String },

    /// Internal channel closed while a call was in flight
    #[error("Channel closed: {0}")]
    ChannelClosed(String),
}

impl StoreError {
    /// Structured absent-key classifier
    ///
    /// True only for the legacy generation's "key not found" error code. The
    /// modern generation signals absence with an empty result set instead.
    pub fn is_key_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::Legacy(LegacyError {
                code: LegacyErrorCode::KeyNotFound,
                ..
            })
        )
    }

    /// True when the call ran out of time
    pub fn is_deadline_exceeded(&self) -> bool {
        match self {
            StoreError::DeadlineExceeded(_) => true,
            StoreError::Rpc(status) => status.code() == tonic::Code::DeadlineExceeded,
            StoreError::Http(err) => err.is_timeout(),
            _ => false,
        }
    }
}

impl From<tonic::Status> for StoreError {
    fn from(status: tonic::Status) -> Self {
        StoreError::Rpc(Box::new(status))
    }
}

impl From<tonic::transport::Error> for StoreError {
    fn from(err: tonic::transport::Error) -> Self {
        StoreError::Transport(Box::new(err))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Http(Box::new(err))
    }
}
