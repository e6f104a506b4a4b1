//! Coordination client facade
//!
//! Provides the components applications interact with:
//! - [`ZkClient`] - node CRUD, watches and session lifecycle
//! - [`ClientBuilder`] - configurable client construction
//!
//! # Basic Usage
//! ```ignore
//! use std::time::Duration;
//! use zkcoord::{CodecKind, CreateMode, ZkClient};
//!
//! let client = ZkClient::builder(vec!["127.0.0.1:2181".into(), "127.0.0.1:2182".into()])
//!     .session_timeout(Duration::from_secs(10))
//!     .codec(CodecKind::Json)
//!     .build()
//!     .await?;
//!
//! client.create_recursive("/app/config", &"v1", CreateMode::Persistent).await?;
//! let stat = client.write_data("/app/config", &"v2", Some(0)).await?;
//! assert_eq!(stat.version, 1);
//! ```

mod builder;
mod scoped_timer;
mod session_link;
mod zk_client;

pub use builder::*;
pub(crate) use scoped_timer::*;
pub(crate) use session_link::*;
pub use zk_client::*;
