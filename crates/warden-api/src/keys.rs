//! Metadata key contracts
//!
//! Exact names and formats of the durable key-value entries the engine
//! persists on instances. These stand in for in-memory timers: the control
//! loop is stateless between invocations, so everything needed to answer
//! "how long since X happened" lives here.

/// Most recent observed activity, RFC 3339.
pub const LAST_ACTIVITY_KEY: &str = "lastActivity";

/// Timestamp of the last warning notification, RFC 3339.
/// Absent until the first warning fires.
pub const LAST_NOTIFICATION_KEY: &str = "lastNotification";

/// Number of warning notifications sent, non-negative base-10 integer
/// as a string. Default "0".
pub const ALERT_COUNT_KEY: &str = "alertCount";

/// Running flag observed on the previous evaluation ("true"/"false"),
/// used to detect a stop -> start transition.
pub const LAST_RUNNING_KEY: &str = "lastRunning";

/// Template metadata key overriding the configured maximum alert count,
/// integer as a string. Optional.
pub const MAX_ALERTS_KEY: &str = "maxAlerts";
