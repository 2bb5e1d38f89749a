use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Calls allowed per window unless configured otherwise.
pub const DEFAULT_LIMIT: usize = 100;

/// Length of the trailing window unless configured otherwise.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(10);

/// How many calls a [`Throttler`](crate::Throttler) may dispatch within any trailing window.
///
/// Serialized with the window in milliseconds, e.g. `{"limit": 100, "window_ms": 10000}`.
/// Missing fields fall back to the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottlerConfig {
    pub limit: usize,
    #[serde(rename = "window_ms", with = "millis")]
    pub window: Duration,
}

impl Default for ThrottlerConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            window: DEFAULT_WINDOW,
        }
    }
}

impl ThrottlerConfig {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self { limit, window }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Check that both the limit and the window are non-zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::ZeroLimit);
        }
        if self.window.is_zero() {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
