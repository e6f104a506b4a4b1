//! Configuration management for the coordination client.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file named by `CONFIG_PATH`
//! - Environment variable overrides (`ZKCOORD__` prefix, `__` separator)
//! - Component-wise validation
mod ensemble;
mod network;
mod retry;
mod session;
pub use ensemble::*;
pub use network::*;
pub use retry::*;
pub use session::*;


use std::env;
use std::fmt::Debug;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::CodecKind;
use crate::Result;

pub(crate) const ENV_PREFIX: &str = "ZKCOORD";

/// Main configuration container for the coordination client
///
/// Combines all subsystem configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Serialize, Deserialize, Clone, Default)]
pub struct CoordConfig {
    /// Ensemble members to connect to
    #[serde(default)]
    pub ensemble: EnsembleConfig,
    /// Session negotiation and request deadlines
    #[serde(default)]
    pub session: SessionConfig,
    /// Transport tuning for ensemble channels
    #[serde(default)]
    pub network: NetworkConfig,
    /// Reconnect backoff while a session is being resumed
    #[serde(default)]
    pub retry: ReconnectPolicy,
    /// Payload codec used for node values
    #[serde(default)]
    pub codec: CodecKind,
}

impl Debug for CoordConfig {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("CoordConfig")
            .field("ensemble", &self.ensemble)
            .field("session", &self.session)
            .field("codec", &self.codec)
            .finish()
    }
}

impl CoordConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `ZKCOORD__` prefix (highest priority)
    ///
    /// # Note
    /// This method does NOT validate the configuration. Callers MUST call `validate()`
    /// before using the configuration.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("ZKCOORD__SESSION__SESSION_TIMEOUT_MS", "60000");
    /// let cfg = CoordConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
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

    /// Validates configuration and returns validated instance.
    pub fn validate(self) -> Result<Self> {
        self.ensemble.validate()?;
        self.session.validate()?;
        self.network.validate()?;
        self.retry.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("ensemble.endpoints")
}
