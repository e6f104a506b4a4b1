//! # zkcoord
//!
//! A session-aware coordination client for ZooKeeper-style ensembles.
//!
//! ## Features
//! - **Sessions**: one logical session survives transport failover between ensemble members
//! - **Nodes**: typed create/read/write/delete of persistent, ephemeral and sequential nodes
//! - **Watches**: permanent data/child listeners built on one-shot server watches
//! - **Codecs**: pluggable payload encoding with header validation
//!
//! ## Quick Start
//! ```ignore
//! use zkcoord::{CreateMode, ZkClient};
//!
//! let client = ZkClient::builder(vec!["127.0.0.1:2181".into()])
//!     .session_timeout(Duration::from_secs(30))
//!     .build()
//!     .await?;
//!
//! client.create("/app", &"v1".to_string(), CreateMode::Persistent).await?;
//! let (value, stat): (String, _) = client.read_data("/app").await?;
//! client.close().await?;
//! ```

mod client;
mod codec;
mod config;
mod connection;
mod constants;
mod errors;
mod metrics;
mod node;
mod watch;

pub mod proto;

pub use client::*;
pub use codec::*;
pub use crate::config::*;
pub use connection::*;
pub use errors::*;
pub use metrics::*;
pub use node::*;
pub use watch::*;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;

//-----------------------------------------------------------
// Autometrics
/// autometrics: https://docs.autometrics.dev/rust/adding-alerts-and-slos
use autometrics::objectives::Objective;
use autometrics::objectives::ObjectiveLatency;
use autometrics::objectives::ObjectivePercentile;
const API_SLO: Objective = Objective::new("api")
    .success_rate(ObjectivePercentile::P99_9)
    .latency(ObjectiveLatency::Ms100, ObjectivePercentile::P99);
