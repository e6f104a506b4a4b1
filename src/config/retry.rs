use std::time::Duration;

use config::ConfigError;
use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Exponential backoff between connect and reconnect attempts
///
/// Attempts stop when the connect budget (first session) or the negotiated
/// session timeout (resumed session) runs out, not after a fixed count.
#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
pub struct ReconnectPolicy {
    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (0-based) with up to 50% jitter.
    pub fn delay(
        &self,
        attempt: u32,
    ) -> Duration {
        let exp = self.base_delay_ms.saturating_mul(1u64 << attempt.min(16));
        let capped = exp.min(self.max_delay_ms);
        let jitter = if capped > 1 {
            rand::thread_rng().gen_range(0..=capped / 2)
        } else {
            0
        };
        Duration::from_millis(capped / 2 + jitter)
    }

    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "retry.base_delay_ms must be > 0".into(),
            )));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(Error::Config(ConfigError::Message(format!(
                "retry.max_delay_ms {} must be >= base_delay_ms {}",
                self.max_delay_ms, self.base_delay_ms
            ))));
        }
        Ok(())
    }
}

fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    2000
}
