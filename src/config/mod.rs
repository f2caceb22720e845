//! Configuration for store access
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Environment variable overrides (`KEYWATCH__` prefix)
//! - Component-wise validation
mod network;
mod watch;
pub use network::*;
pub use watch::*;


use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::CONFIG_ENV_PREFIX;
use crate::Error;
use crate::Generation;
use crate::Result;

/// Store access configuration consumed by the engine
///
/// Sources, later ones override earlier:
/// 1. Default values from code
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoreConfig {
    /// Store generation the backend speaks
    #[serde(default)]
    pub generation: Generation,

    /// Store endpoints, tried in order
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub watch: WatchConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            generation: Generation::default(),
            endpoints: default_endpoints(),
            network: NetworkConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Validation is deferred so further overrides can be applied with
    /// [`with_override_config`](Self::with_override_config). Callers must call
    /// [`validate`](Self::validate) before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("KEYWATCH__WATCH__TIMEOUT_MS", "5000");
    /// let cfg = StoreConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        let config: Self = builder.add_source(env_source()).build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional overrides from file without validation.
    ///
    /// Merging order: current values, then the file, then the environment.
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates every section and returns the validated instance
    pub fn validate(self) -> Result<Self> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "at least one store endpoint is required".to_string(),
            )));
        }
        if let Some(endpoint) = self.endpoints.iter().find(|e| e.trim().is_empty()) {
            return Err(Error::Config(ConfigError::Message(format!(
                "blank store endpoint {endpoint:?}"
            ))));
        }
        self.network.validate()?;
        self.watch.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(CONFIG_ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("endpoints")
        .with_list_parse_key("watch.prefixes")
}

fn default_endpoints() -> Vec<String> {
    vec!["http://127.0.0.1:2379".to_string()]
}
