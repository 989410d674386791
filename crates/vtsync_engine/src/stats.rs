//! Counters describing engine activity.

/// Statistics about sync operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Operations started.
    pub operations_started: u64,
    /// Operations finished, successfully or not.
    pub operations_finished: u64,
    /// Operations that finished with an error.
    pub operations_failed: u64,
    /// Requests handed to the transport, including resends.
    pub requests_sent: u64,
    /// Resends triggered by a request timeout.
    pub timeout_resends: u64,
    /// Resends triggered by a reconnect.
    pub reconnect_resends: u64,
    /// Responses dropped because the operation had already finished.
    pub late_responses: u64,
    /// Advance responses processed.
    pub advances_completed: u64,
    /// Fetch operations scheduled by advances.
    pub fetches_scheduled: u64,
    /// Fetched values delivered to listeners.
    pub values_delivered: u64,
    /// Fetched values dropped as already seen or stale.
    pub values_dropped: u64,
    /// Confirmed clock commits.
    pub clock_commits: u64,
}
