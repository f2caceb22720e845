use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Watch adapter settings
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct WatchConfig {
    /// Per `next` call bound in milliseconds; 0 waits indefinitely
    #[serde(default)]
    pub timeout_ms: u64,

    /// Key prefixes the engine subscribes to
    #[serde(default)]
    pub prefixes: Vec<String>,
}

impl WatchConfig {
    pub fn validate(&self) -> Result<()> {
        for prefix in &self.prefixes {
            if prefix.is_empty() {
                return Err(Error::Config(ConfigError::Message(
                    "watch prefix cannot be empty".to_string(),
                )));
            }
            if !prefix.starts_with('/') {
                return Err(Error::Config(ConfigError::Message(format!(
                    "watch prefix {prefix:?} must start with '/'"
                ))));
            }
        }

        Ok(())
    }

    /// Zero means unbounded
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
