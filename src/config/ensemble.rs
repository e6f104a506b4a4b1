use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Ensemble members, tried in order on connect and failover.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct EnsembleConfig {
    /// `host:port` or full `http://host:port` addresses
    #[serde(default)]
    pub endpoints: Vec<String>,
}

impl EnsembleConfig {
    /// Parses a `host:port,host:port` connect string.
    pub fn from_connect_string(connect_string: &str) -> Self {
        Self {
            endpoints: connect_string
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
        }
    }

    /// Endpoints as channel URIs, `http://` added where no scheme is given.
    pub fn uris(&self) -> Vec<String> {
        self.endpoints.iter().map(|e| endpoint_uri(e)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Config(ConfigError::Message(
                "ensemble.endpoints must contain at least one member".into(),
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for e in &self.endpoints {
            if e.trim().is_empty() {
                return Err(Error::Config(ConfigError::Message("empty ensemble endpoint".into())));
            }
            if !seen.insert(endpoint_uri(e)) {
                return Err(Error::Config(ConfigError::Message(format!(
                    "duplicate ensemble endpoint {e}"
                ))));
            }
        }
        Ok(())
    }
}

pub(crate) fn endpoint_uri(endpoint: &str) -> String {
    let endpoint = endpoint.trim();
    if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}
