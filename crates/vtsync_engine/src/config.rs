//! Configuration for the sync engine.

use std::time::Duration;

/// Default per-attempt request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Default delay between advances when nothing had to be fetched.
pub const DEFAULT_ADVANCE_INTERVAL: Duration = Duration::from_secs(5);

/// Configuration for a sync client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Time to wait for a response before resending while connected.
    pub request_timeout: Duration,
    /// Delay before the next advance when the previous one fetched nothing.
    pub advance_interval: Duration,
    /// Whether confirmed clocks are only ever moved forward.
    pub monotonic_clock: bool,
}

impl ClientConfig {
    /// Creates a configuration with the default timings.
    pub fn new() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            advance_interval: DEFAULT_ADVANCE_INTERVAL,
            monotonic_clock: true,
        }
    }

    /// Sets the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the advance poll interval.
    pub fn with_advance_interval(mut self, interval: Duration) -> Self {
        self.advance_interval = interval;
        self
    }

    /// Sets whether confirmed clocks may only increase.
    ///
    /// With `false`, every commit overwrites the stored clock, even with an
    /// older value.
    pub fn with_monotonic_clock(mut self, monotonic: bool) -> Self {
        self.monotonic_clock = monotonic;
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
