/// Version argument matching any node version
pub(crate) const ANY_VERSION: i32 = -1;

/// Service name reported to the gRPC health protocol
pub(crate) const COORD_SERVICE_NAME: &str = "zkcoord.CoordService";

/// Session id presented when asking the ensemble for a new session
pub(crate) const NEW_SESSION_ID: i64 = 0;
