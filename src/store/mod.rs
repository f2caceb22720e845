//! Generation-agnostic read/watch capabilities
//!
//! The store speaks two incompatible client generations:
//! - legacy: HTTP long-poll, one event per watch response
//! - modern: streaming watch, events delivered in batches
//!
//! Both are hidden behind two capability traits. A consumer picks a
//! [`Backend`] once at construction and afterwards only sees [`ReadApi`] and
//! [`KeyWatcher`]:
//!
//! ```ignore
//! let backend = Backend::Modern { kv: store.clone(), watch: store };
//! let reader = backend.read_api();
//! let mut watcher = backend.key_watcher("/data", &WatchConfig::default());
//!
//! if let Some(value) = reader.get("/block/3").await? {
//!     println!("block: {value}");
//! }
//! let change = watcher.next().await?;
//! ```

pub mod legacy;
pub mod modern;

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tonic::async_trait;

use self::legacy::HttpKeysApi;
use self::legacy::LegacyKeyWatcher;
use self::legacy::LegacyKeysApi;
use self::legacy::LegacyReadApi;
use self::modern::GrpcStore;
use self::modern::ModernKeyWatcher;
use self::modern::ModernKv;
use self::modern::ModernReadApi;
use self::modern::ModernWatchApi;
use crate::StoreError;
use crate::StoreConfig;
use crate::StoreResult;
use crate::WatchConfig;


/// One change observed under a watched prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyChange {
    pub key: String,
    /// `None` when the key was deleted or expired
    pub value: Option<String>,
}

impl KeyChange {
    pub fn put(
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    pub fn removed(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    pub fn is_removal(&self) -> bool {
        self.value.is_none()
    }
}

/// Point reads against the live store
#[async_trait]
pub trait ReadApi: Send + Sync {
    /// Current value of `key`
    ///
    /// # Returns
    /// - `Ok(Some(value))` if the key exists
    /// - `Ok(None)` if it does not; absence is not an error
    /// - `Err(_)` on transport failure or when the read outlives its 60s scope
    async fn get(
        &self,
        key: &str,
    ) -> StoreResult<Option<String>>;
}

/// Pull-style subscription to every key under one prefix
///
/// `next` takes `&mut self`: a subscription has exactly one consumer and calls
/// are serialized by construction.
#[async_trait]
pub trait KeyWatcher: Send {
    /// Waits for the next change under the prefix
    ///
    /// Returns exactly one change per call. On error the current call scope
    /// has been released; whether to keep calling is the caller's decision.
    async fn next(&mut self) -> StoreResult<KeyChange>;

    fn prefix(&self) -> &str;
}

/// Store client generation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Generation {
    /// HTTP long-poll keys API
    #[serde(alias = "v2")]
    Legacy,
    /// Streaming gRPC API
    #[default]
    #[serde(alias = "v3")]
    Modern,
}

impl fmt::Display for Generation {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            Generation::Legacy => write!(f, "legacy"),
            Generation::Modern => write!(f, "modern"),
        }
    }
}

/// Store client selected once at construction
#[derive(Clone)]
pub enum Backend {
    Legacy(Arc<dyn LegacyKeysApi>),
    Modern {
        kv: Arc<dyn ModernKv>,
        watch: Arc<dyn ModernWatchApi>,
    },
}

impl fmt::Debug for Backend {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_tuple("Backend").field(&self.generation()).finish()
    }
}

impl Backend {
    /// Builds the transport for the configured generation
    ///
    /// The modern generation connects eagerly and fails when no endpoint
    /// answers; the legacy HTTP client connects on its first request.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        match config.generation {
            Generation::Legacy => {
                let keys = HttpKeysApi::new(&config.endpoints, &config.network)?;
                Ok(Backend::Legacy(Arc::new(keys)))
            }
            Generation::Modern => {
                let store = Arc::new(GrpcStore::connect(&config.endpoints, &config.network).await?);
                Ok(Backend::Modern {
                    kv: store.clone(),
                    watch: store,
                })
            }
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            Backend::Legacy(_) => Generation::Legacy,
            Backend::Modern { .. } => Generation::Modern,
        }
    }

    pub fn read_api(&self) -> Box<dyn ReadApi> {
        match self {
            Backend::Legacy(keys) => Box::new(LegacyReadApi::new(keys.clone())),
            Backend::Modern { kv, .. } => Box::new(ModernReadApi::new(kv.clone())),
        }
    }

    /// Opens a recursive watch on `prefix`
    ///
    /// The legacy generation subscribes immediately; the modern generation
    /// opens its channel on the first `next` call.
    pub fn key_watcher(
        &self,
        prefix: &str,
        config: &WatchConfig,
    ) -> Box<dyn KeyWatcher> {
        match self {
            Backend::Legacy(keys) => Box::new(LegacyKeyWatcher::new(keys.as_ref(), prefix, config.timeout())),
            Backend::Modern { watch, .. } => Box::new(ModernKeyWatcher::new(watch.clone(), prefix, config.timeout())),
        }
    }
}

/// Prepends `http://` when the endpoint carries no scheme
pub(crate) fn address_str(addr: &str) -> String {
    if addr.starts_with("http://") || addr.starts_with("https://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

/// Rejects empty keys before they reach a transport
pub(crate) fn ensure_key(key: &str) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
