use std::fmt;
use std::time::Duration;

use bytes::Bytes;

use crate::proto::WatchEvent;

/// Lifecycle of a logical session.
///
/// `Connecting -> Connected -> Reconnecting -> Connected | Expired`, and any
/// state may move to `Closed`. `Expired` and `Closed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Connected,
    Reconnecting,
    Expired,
    Closed,
}

impl SessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SessionState::Connected)
    }

    /// No further transitions except `Closed` are possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Expired | SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let s = match self {
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Reconnecting => "reconnecting",
            SessionState::Expired => "expired",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Snapshot of the logical session owned by a connection manager.
#[derive(Clone)]
pub struct Session {
    pub session_id: i64,
    pub(crate) passwd: Bytes,
    /// Timeout granted by the ensemble, may differ from the requested one
    pub negotiated_timeout: Duration,
    /// Ensemble member currently serving the session
    pub endpoint: String,
    pub state: SessionState,
    /// Highest transaction id observed in any reply
    pub last_zxid_seen: i64,
}

impl fmt::Debug for Session {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("Session")
            .field("session_id", &format_args!("0x{:x}", self.session_id))
            .field("negotiated_timeout", &self.negotiated_timeout)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("last_zxid_seen", &self.last_zxid_seen)
            .finish()
    }
}

impl Session {
    pub(crate) fn new(requested_timeout: Duration) -> Self {
        Self {
            session_id: crate::constants::NEW_SESSION_ID,
            passwd: Bytes::new(),
            negotiated_timeout: requested_timeout,
            endpoint: String::new(),
            state: SessionState::Connecting,
            last_zxid_seen: 0,
        }
    }

    /// Heartbeat period derived from the negotiated timeout
    pub fn ping_interval(&self) -> Duration {
        (self.negotiated_timeout / 3).max(Duration::from_millis(10))
    }
}

/// Messages delivered from the session driver to the watch dispatcher.
#[derive(Debug, Clone)]
pub(crate) enum Notification {
    /// One-shot server watch fired
    Watch(WatchEvent),
    /// Session state transition
    State(SessionState),
    /// A fresh session replaced an expired one
    NewSession(i64),
}
