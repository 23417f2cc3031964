// dashboard-client/src/connection/mod.rs
//! Live order sync: stream connection, backoff and polling fallback

mod manager;

pub use manager::ConnectionManager;

use std::time::Duration;

/// Sync timing configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Delay before the first reconnect
    pub initial_retry_delay: Duration,
    /// Upper bound of the exponential backoff
    pub max_retry_delay: Duration,
    /// Reconnects tried before falling back to polling
    pub max_retry_attempts: u32,
    /// Full refresh interval while polling
    pub poll_interval: Duration,
    /// How long a newly created order stays highlighted
    pub new_order_highlight: Duration,
    /// Capacity of the update channel towards the cache
    pub update_buffer: usize,
}

impl Default for SyncConfig {
    /// Store-floor defaults
    ///
    /// - reconnect after 1, 2, 4, 8, 16 seconds
    /// - then a full refresh every 10 seconds
    fn default() -> Self {
        Self {
            initial_retry_delay: Duration::from_secs(1),
            max_retry_delay: Duration::from_secs(16),
            max_retry_attempts: 5,
            poll_interval: Duration::from_secs(10),
            new_order_highlight: Duration::from_secs(3),
            update_buffer: 256,
        }
    }
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same-network server (default)
    pub fn lan() -> Self {
        Self::default()
    }

    /// Remote server over the internet
    ///
    /// Tolerates longer outages before giving up on the stream and polls less often.
    pub fn wan() -> Self {
        Self {
            initial_retry_delay: Duration::from_secs(2),
            max_retry_delay: Duration::from_secs(60),
            max_retry_attempts: 8,
            poll_interval: Duration::from_secs(30),
            ..Self::default()
        }
    }

    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.initial_retry_delay = delay;
        self
    }

    pub fn with_max_retry_delay(mut self, delay: Duration) -> Self {
        self.max_retry_delay = delay;
        self
    }

    pub fn with_max_retry_attempts(mut self, attempts: u32) -> Self {
        self.max_retry_attempts = attempts;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_new_order_highlight(mut self, duration: Duration) -> Self {
        self.new_order_highlight = duration;
        self
    }

    pub fn with_update_buffer(mut self, capacity: usize) -> Self {
        self.update_buffer = capacity.max(1);
        self
    }

    /// Backoff before reconnect number `attempt + 1`: `initial * 2^attempt`, capped
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial_retry_delay
            .saturating_mul(factor)
            .min(self.max_retry_delay)
    }
}
