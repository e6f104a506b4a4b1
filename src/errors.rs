//! Coordination Client Error Hierarchy
//!
//! Errors are grouped by the layer that raises them: the session/transport
//! layer, node-level rejections reported by the ensemble, and payload codecs.
//! Reads are retried internally after transport loss; anything that reaches the caller
//! is one of these typed failures.

use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session establishment, transport and session lifecycle failures
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Node-level rejections reported by the ensemble
    #[error(transparent)]
    Node(#[from] NodeError),

    /// Payload serialization failures
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A wire operation did not complete within the configured operation timeout
    #[error("Operation {op} timed out after {timeout:?}")]
    OperationTimeout { op: &'static str, timeout: Duration },

    /// Client configuration loading or validation failures
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Unrecoverable failures
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// A member accepted the transport but no session was established in time
    #[error("Connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// No ensemble member could be reached during the connect window
    #[error("Ensemble unreachable, tried {endpoints:?}")]
    EnsembleUnreachable { endpoints: Vec<String> },

    /// The session is gone; a fresh connect is required
    #[error("Session 0x{session_id:x} expired")]
    SessionExpired { session_id: i64 },

    /// The client was closed by the caller
    #[error("Session closed")]
    Closed,

    /// The member answered its health probe with a not-serving status
    #[error("Ensemble member {endpoint} is not serving")]
    NotServing { endpoint: String },

    /// Malformed ensemble endpoint
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    Transport(#[from] Box<tonic::transport::Error>),

    /// gRPC status code errors
    #[error(transparent)]
    Rpc(#[from] Box<tonic::Status>),

    /// Reply did not carry the correlation id of its request
    #[error("Reply xid {got} does not match request xid {expected}")]
    XidMismatch { expected: i32, got: i32 },

    /// The transport failed after a write was sent; it may or may not have
    /// been applied
    #[error("Connection lost during {op}, outcome unknown")]
    ConnectionLoss { op: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("Node {path} already exists")]
    NodeExists { path: String },

    #[error("Node {path} does not exist")]
    NoNode { path: String },

    #[error("Parent of {path} does not exist")]
    NoParent { path: String },

    #[error("Node {path} has children")]
    NotEmpty { path: String },

    #[error("Version conflict on {path}: expected version {expected}")]
    VersionConflict { path: String, expected: i32 },

    #[error("Ephemeral node cannot have children: {path}")]
    NoChildrenForEphemerals { path: String },

    #[error("Invalid path {path:?}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Payload could not be decoded with the configured codec
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Empty payload")]
    Empty,

    /// Header missing or unknown, typically a value written by another tool
    #[error("invalid stream header: {found}")]
    InvalidHeader { found: String },

    /// Payload carries the header of another codec
    #[error("Payload format mismatch: expected {expected}, found {found}")]
    FormatMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Unsupported {format} format version {version}")]
    UnsupportedVersion { format: &'static str, version: u8 },

    #[error("Malformed {format} payload: {reason}")]
    Malformed { format: &'static str, reason: String },
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Codec(CodecError::Decode(e))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Connection(ConnectionError::Rpc(Box::new(status)))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Connection(ConnectionError::Transport(Box::new(e)))
    }
}

impl Error {
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::ConnectionLoss { .. }))
    }

    /// The session can no longer serve requests
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Connection(ConnectionError::SessionExpired { .. }))
    }

    pub fn is_no_node(&self) -> bool {
        matches!(self, Error::Node(NodeError::NoNode { .. }))
    }

    pub fn is_node_exists(&self) -> bool {
        matches!(self, Error::Node(NodeError::NodeExists { .. }))
    }

    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Error::Node(NodeError::VersionConflict { .. }))
    }
}
