//! Protocol Buffer definitions and generated code for the coordination service.
//!
//! Types are generated by [`tonic-build`] from `proto/coord_service.proto`.
//! The extension impls below map reply headers onto the crate error types.

#![allow(clippy::all)]

tonic::include_proto!("zkcoord");

use crate::ConnectionError;
use crate::Error;
use crate::NodeError;
use crate::Result;

/// Access to the reply header every session-scoped response carries.
pub(crate) trait Reply {
    fn reply_header(&self) -> Option<&ReplyHeader>;
}

/// Session-scoped requests carry the session id and correlation xid.
pub(crate) trait SessionRequest {
    fn set_header(
        &mut self,
        header: RequestHeader,
    );
}

macro_rules! impl_reply {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Reply for $ty {
                fn reply_header(&self) -> Option<&ReplyHeader> {
                    self.header.as_ref()
                }
            }
        )*
    };
}

impl_reply!(
    OpenSessionResponse,
    PingResponse,
    CloseSessionResponse,
    CreateResponse,
    DeleteResponse,
    ExistsResponse,
    GetDataResponse,
    SetDataResponse,
    GetChildrenResponse,
);

macro_rules! impl_session_request {
    ($($ty:ty),* $(,)?) => {
        $(
            impl SessionRequest for $ty {
                fn set_header(&mut self, header: RequestHeader) {
                    self.header = Some(header);
                }
            }
        )*
    };
}

impl_session_request!(
    PingRequest,
    CloseSessionRequest,
    CreateRequest,
    DeleteRequest,
    ExistsRequest,
    GetDataRequest,
    SetDataRequest,
    GetChildrenRequest,
    WatchEventsRequest,
);

impl ReplyHeader {
    /// Reply code, unknown codes read as a system error
    pub(crate) fn code(&self) -> ErrorCode {
        ErrorCode::try_from(self.err).unwrap_or(ErrorCode::SystemError)
    }

    #[cfg(test)]
    pub(crate) fn success(
        xid: i32,
        zxid: i64,
    ) -> Self {
        Self {
            xid,
            zxid,
            err: ErrorCode::Success as i32,
        }
    }

    #[cfg(test)]
    pub(crate) fn failure(
        xid: i32,
        zxid: i64,
        code: ErrorCode,
    ) -> Self {
        Self {
            xid,
            zxid,
            err: code as i32,
        }
    }
}

impl ErrorCode {
    /// Converts a reply code into the typed error for an operation on `path`.
    ///
    /// `expected_version` is only used to describe version conflicts.
    pub(crate) fn into_result(
        self,
        path: &str,
        expected_version: i32,
        session_id: i64,
    ) -> Result<()> {
        let path = path.to_string();
        match self {
            ErrorCode::Success => Ok(()),
            ErrorCode::NodeExists => Err(NodeError::NodeExists { path }.into()),
            ErrorCode::NoNode => Err(NodeError::NoNode { path }.into()),
            ErrorCode::NoParent => Err(NodeError::NoParent { path }.into()),
            ErrorCode::NotEmpty => Err(NodeError::NotEmpty { path }.into()),
            ErrorCode::BadVersion => Err(NodeError::VersionConflict {
                path,
                expected: expected_version,
            }
            .into()),
            ErrorCode::NoChildrenForEphemerals => Err(NodeError::NoChildrenForEphemerals { path }.into()),
            ErrorCode::InvalidPath => Err(NodeError::InvalidPath {
                path,
                reason: "rejected by ensemble",
            }
            .into()),
            ErrorCode::SessionExpired => Err(ConnectionError::SessionExpired { session_id }.into()),
            ErrorCode::SystemError => Err(Error::Fatal(format!("ensemble system error on {path}"))),
        }
    }
}
