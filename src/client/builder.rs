use std::time::Duration;

use super::ZkClient;
use crate::Codec;
use crate::CodecKind;
use crate::CoordConfig;
use crate::EnsembleConfig;
use crate::NodeCodec;
use crate::ReconnectPolicy;
use crate::Result;

pub struct ClientBuilder {
    config: CoordConfig,
}

impl ClientBuilder {
    /// Create a new builder with default config and specified endpoints
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            config: CoordConfig {
                ensemble: EnsembleConfig { endpoints },
                ..CoordConfig::default()
            },
        }
    }

    /// Create a builder from a `host:port,host:port` connect string
    pub fn from_connect_string(connect_string: &str) -> Self {
        Self {
            config: CoordConfig {
                ensemble: EnsembleConfig::from_connect_string(connect_string),
                ..CoordConfig::default()
            },
        }
    }

    /// Requested session timeout (default: 30s); the ensemble negotiates the final value
    pub fn session_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.session.session_timeout_ms = duration_ms(timeout);
        self
    }

    /// Budget for establishing the first session (default: 15s)
    pub fn connect_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.session.connect_timeout_ms = duration_ms(timeout);
        self
    }

    /// Deadline of every node operation, retries included (default: 10s)
    pub fn operation_timeout(
        mut self,
        timeout: Duration,
    ) -> Self {
        self.config.session.operation_timeout_ms = duration_ms(timeout);
        self
    }

    /// Payload codec of [`build`](ClientBuilder::build) (default: binary)
    pub fn codec(
        mut self,
        codec: CodecKind,
    ) -> Self {
        self.config.codec = codec;
        self
    }

    /// Enable/disable compression (default: disabled)
    pub fn enable_compression(
        mut self,
        enable: bool,
    ) -> Self {
        self.config.network.enable_compression = enable;
        self
    }

    /// Probe member health before opening a session on it (default: enabled)
    pub fn health_check(
        mut self,
        enable: bool,
    ) -> Self {
        self.config.network.health_check = enable;
        self
    }

    pub fn reconnect_policy(
        mut self,
        policy: ReconnectPolicy,
    ) -> Self {
        self.config.retry = policy;
        self
    }

    /// Completely replaces the default configuration
    ///
    /// # Warning: Configuration Override
    /// This will discard all previous settings configured through individual
    /// methods like [`session_timeout`](ClientBuilder::session_timeout) or
    /// [`codec`](ClientBuilder::codec). The builder endpoints are kept only
    /// when `config` names none.
    ///
    /// # Example: Full Configuration
    /// ```ignore
    /// use zkcoord::{ClientBuilder, CoordConfig};
    ///
    /// let config = CoordConfig::new()?;
    /// let client = ClientBuilder::new(vec!["127.0.0.1:2181".into()])
    ///     .set_config(config)
    ///     .build()
    ///     .await?;
    /// ```
    pub fn set_config(
        mut self,
        mut config: CoordConfig,
    ) -> Self {
        if config.ensemble.endpoints.is_empty() {
            config.ensemble = std::mem::take(&mut self.config.ensemble);
        }
        self.config = config;
        self
    }

    /// Build the client with the codec named by the configuration
    pub async fn build(self) -> Result<ZkClient> {
        let codec = Codec::from(self.config.codec);
        self.build_with_codec(codec).await
    }

    /// Build the client with a custom codec
    pub async fn build_with_codec<C: NodeCodec>(
        self,
        codec: C,
    ) -> Result<ZkClient<C>> {
        let config = self.config.validate()?;
        ZkClient::connect(config, codec).await
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
