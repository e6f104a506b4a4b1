use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Transport parameters of the channel to an ensemble member
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct NetworkConfig {
    /// TCP connect timeout of a single dial in milliseconds
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_in_ms: u64,

    /// TCP keepalive in seconds
    #[serde(default = "default_tcp_keepalive")]
    pub tcp_keepalive_in_secs: u64,

    /// HTTP2 keepalive ping interval in seconds
    #[serde(default = "default_h2_keepalive_interval")]
    pub http2_keep_alive_interval_in_secs: u64,

    /// HTTP2 keepalive timeout in seconds
    #[serde(default = "default_h2_keepalive_timeout")]
    pub http2_keep_alive_timeout_in_secs: u64,

    /// Gzip request and response bodies
    #[serde(default)]
    pub enable_compression: bool,

    /// Probe the gRPC health service of a member before opening a session on it
    #[serde(default = "default_health_check")]
    pub health_check: bool,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            dial_timeout_in_ms: default_dial_timeout(),
            tcp_keepalive_in_secs: default_tcp_keepalive(),
            http2_keep_alive_interval_in_secs: default_h2_keepalive_interval(),
            http2_keep_alive_timeout_in_secs: default_h2_keepalive_timeout(),
            enable_compression: false,
            health_check: default_health_check(),
        }
    }
}

impl NetworkConfig {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_in_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dial_timeout_in_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "network.dial_timeout_in_ms must be > 0".into(),
            )));
        }

        if self.http2_keep_alive_timeout_in_secs >= self.http2_keep_alive_interval_in_secs {
            return Err(Error::Config(ConfigError::Message(format!(
                "keepalive timeout {}s must be < interval {}s",
                self.http2_keep_alive_timeout_in_secs, self.http2_keep_alive_interval_in_secs
            ))));
        }
        Ok(())
    }
}

fn default_dial_timeout() -> u64 {
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
fn default_health_check() -> bool {
    true
}
