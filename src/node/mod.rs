//! Node addressing and metadata.
//!
//! - [`CreateMode`] - persistence x ordering variants of a node
//! - [`Stat`] - server-confirmed node metadata
//! - [`path`] - validation and manipulation of node paths

pub mod path;


use serde::Deserialize;
use serde::Serialize;

use crate::proto;

/// How a node is created.
///
/// Two orthogonal axes: persistence (persistent / ephemeral) and ordering
/// (plain / sequential). Ephemeral nodes live as long as the creating session;
/// sequential nodes get an ensemble-assigned, zero-padded counter appended to
/// the requested path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CreateMode {
    Persistent,
    PersistentSequential,
    Ephemeral,
    EphemeralSequential,
}

impl CreateMode {
    pub fn new(
        ephemeral: bool,
        sequential: bool,
    ) -> Self {
        match (ephemeral, sequential) {
            (false, false) => CreateMode::Persistent,
            (false, true) => CreateMode::PersistentSequential,
            (true, false) => CreateMode::Ephemeral,
            (true, true) => CreateMode::EphemeralSequential,
        }
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, CreateMode::Ephemeral | CreateMode::EphemeralSequential)
    }

    pub fn is_sequential(&self) -> bool {
        matches!(self, CreateMode::PersistentSequential | CreateMode::EphemeralSequential)
    }
}

impl From<CreateMode> for proto::CreateMode {
    fn from(mode: CreateMode) -> Self {
        match mode {
            CreateMode::Persistent => proto::CreateMode::Persistent,
            CreateMode::PersistentSequential => proto::CreateMode::PersistentSequential,
            CreateMode::Ephemeral => proto::CreateMode::Ephemeral,
            CreateMode::EphemeralSequential => proto::CreateMode::EphemeralSequential,
        }
    }
}

impl From<proto::CreateMode> for CreateMode {
    fn from(mode: proto::CreateMode) -> Self {
        match mode {
            proto::CreateMode::Persistent => CreateMode::Persistent,
            proto::CreateMode::PersistentSequential => CreateMode::PersistentSequential,
            proto::CreateMode::Ephemeral => CreateMode::Ephemeral,
            proto::CreateMode::EphemeralSequential => CreateMode::EphemeralSequential,
        }
    }
}

/// Node metadata as confirmed by the ensemble.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stat {
    /// Transaction id of the create
    pub czxid: i64,
    /// Transaction id of the last data modification
    pub mzxid: i64,
    /// Creation time, ms since epoch
    pub ctime: i64,
    /// Last modification time, ms since epoch
    pub mtime: i64,
    /// Data version, 0 on create
    pub version: i32,
    /// Child list version
    pub cversion: i32,
    /// ACL version
    pub aversion: i32,
    /// Owning session id for ephemeral nodes, 0 otherwise
    pub ephemeral_owner: i64,
    pub data_length: i32,
    pub num_children: i32,
    /// Transaction id of the last child list modification
    pub pzxid: i64,
}

impl Stat {
    pub fn is_ephemeral(&self) -> bool {
        self.ephemeral_owner != 0
    }
}

impl From<proto::Stat> for Stat {
    fn from(s: proto::Stat) -> Self {
        Self {
            czxid: s.czxid,
            mzxid: s.mzxid,
            ctime: s.ctime,
            mtime: s.mtime,
            version: s.version,
            cversion: s.cversion,
            aversion: s.aversion,
            ephemeral_owner: s.ephemeral_owner,
            data_length: s.data_length,
            num_children: s.num_children,
            pzxid: s.pzxid,
        }
    }
}

impl From<Stat> for proto::Stat {
    fn from(s: Stat) -> Self {
        Self {
            czxid: s.czxid,
            mzxid: s.mzxid,
            ctime: s.ctime,
            mtime: s.mtime,
            version: s.version,
            cversion: s.cversion,
            aversion: s.aversion,
            ephemeral_owner: s.ephemeral_owner,
            data_length: s.data_length,
            num_children: s.num_children,
            pzxid: s.pzxid,
        }
    }
}
