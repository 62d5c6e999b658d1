//! Polling configuration.

use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Cadence, deadline and transient-failure tolerance for one poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Delay between status checks; the first check runs one interval after start.
    pub interval: Duration,
    /// Overall deadline for reaching a terminal status.
    pub timeout: Duration,
    /// Consecutive failed checks tolerated before the loop aborts. 0 = fail on the first.
    pub max_transient_retries: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_transient_retries: 0,
        }
    }
}

impl PollConfig {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            max_transient_retries: 0,
        }
    }

    pub fn with_max_transient_retries(mut self, retries: u32) -> Self {
        self.max_transient_retries = retries;
        self
    }

    /// Reads `CHALPU_POLL_INTERVAL_MS`, `CHALPU_POLL_TIMEOUT_MS` and
    /// `CHALPU_MAX_TRANSIENT_RETRIES`; unset or unparsable values keep the defaults.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a caller-supplied lookup.
    pub fn from_vars(get: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| get(key).and_then(|v| v.trim().parse::<u64>().ok());
        let defaults = Self::default();
        let interval = parse("CHALPU_POLL_INTERVAL_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.interval);
        let timeout = parse("CHALPU_POLL_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(defaults.timeout);
        let max_transient_retries = parse("CHALPU_MAX_TRANSIENT_RETRIES")
            .and_then(|v| u32::try_from(v).ok())
            .unwrap_or(defaults.max_transient_retries);
        Self {
            interval,
            timeout,
            max_transient_retries,
        }
    }

    /// Interval as used by the timer; never zero.
    pub(crate) fn effective_interval(&self) -> Duration {
        self.interval.max(Duration::from_millis(1))
    }
}
