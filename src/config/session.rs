use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Session and request deadlines
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionConfig {
    /// Requested session timeout; the ensemble may negotiate it down or up
    #[serde(default = "default_session_timeout")]
    pub session_timeout_ms: u64,

    /// Budget for establishing the first session
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Deadline of a single wire operation, retries included
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_timeout_ms: default_session_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            operation_timeout_ms: default_operation_timeout(),
        }
    }
}

impl SessionConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.session_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session.session_timeout_ms must be > 0".into(),
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session.connect_timeout_ms must be > 0".into(),
            )));
        }
        if self.operation_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "session.operation_timeout_ms must be > 0".into(),
            )));
        }
        if i32::try_from(self.session_timeout_ms).is_err() {
            return Err(Error::Config(ConfigError::Message(format!(
                "session.session_timeout_ms {} exceeds {}",
                self.session_timeout_ms,
                i32::MAX
            ))));
        }
        Ok(())
    }
}

fn default_session_timeout() -> u64 {
    30_000
}
fn default_connect_timeout() -> u64 {
    15_000
}
fn default_operation_timeout() -> u64 {
    10_000
}
