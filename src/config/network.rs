use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_WATCH_BUFFER_SIZE;
use crate::Error;
use crate::Result;

/// Connection parameters for the gRPC transport
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// gRPC request completion timeout in milliseconds (0 disables it)
    #[serde(default)]
    pub request_timeout_ms: u64,

    /// TCP keepalive in seconds (0 disables it)
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keepalive_interval_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keepalive_timeout_secs: u64,

    /// Gzip request and response bodies
    #[serde(default)]
    pub enable_compression: bool,

    /// Batches buffered between a watch stream and its adapter
    #[serde(default = "default_watch_buffer_size")]
    pub watch_buffer_size: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: 0,
            tcp_keepalive_secs: default_tcp_keepalive(),
            http2_keepalive_interval_secs: default_h2_keepalive_interval(),
            http2_keepalive_timeout_secs: default_h2_keepalive_timeout(),
            enable_compression: false,
            watch_buffer_size: default_watch_buffer_size(),
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "connect timeout must be > 0".to_string(),
            )));
        }

        if self.request_timeout_ms != 0 && self.request_timeout_ms <= self.connect_timeout_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "request timeout {}ms must exceed connect timeout {}ms",
                self.request_timeout_ms, self.connect_timeout_ms
            ))));
        }

        if self.http2_keepalive_timeout_secs >= self.http2_keepalive_interval_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "http2 keepalive timeout {}s must be shorter than interval {}s",
                self.http2_keepalive_timeout_secs, self.http2_keepalive_interval_secs
            ))));
        }

        if self.watch_buffer_size == 0 {
            return Err(Error::Config(ConfigError::Message(
                "watch buffer size must be > 0".to_string(),
            )));
        }

        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// `None` when requests are not bounded at the transport level
    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }

    pub fn tcp_keepalive(&self) -> Option<Duration> {
        (self.tcp_keepalive_secs > 0).then(|| Duration::from_secs(self.tcp_keepalive_secs))
    }

    pub fn http2_keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.http2_keepalive_interval_secs)
    }

    pub fn http2_keepalive_timeout(&self) -> Duration {
        Duration::from_secs(self.http2_keepalive_timeout_secs)
    }
}

fn default_connect_timeout() -> u64 {
    1000
}
fn default_tcp_keepalive() -> u64 {
    300
}
fn default_h2_keepalive_interval() -> u64 {
    60
}
fn default_h2_keepalive_timeout() -> u64 {
    20
}
fn default_watch_buffer_size() -> usize {
    DEFAULT_WATCH_BUFFER_SIZE
}
