use std::env;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_THROTTLE_MS: u64 = 300;

/// Bus configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusConfig {
    /// Delay used by throttled dispatch when the caller passes none.
    pub throttle_delay: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            throttle_delay: Duration::from_millis(DEFAULT_THROTTLE_MS),
        }
    }
}

impl BusConfig {
    /// Read `TRIAD_THROTTLE_MS`. Missing or unparsable values fall back to
    /// the default.
    pub fn from_env() -> Self {
        Self {
            throttle_delay: Duration::from_millis(throttle_ms(env::var("TRIAD_THROTTLE_MS").ok())),
        }
    }

    pub fn with_throttle_delay(mut self, delay: Duration) -> Self {
        self.throttle_delay = delay;
        self
    }
}

fn throttle_ms(raw: Option<String>) -> u64 {
    let Some(raw) = raw else {
        return DEFAULT_THROTTLE_MS;
    };
    raw.trim().parse().unwrap_or_else(|_| {
        warn!(value = %raw, default = DEFAULT_THROTTLE_MS, "TRIAD_THROTTLE_MS is not a non-negative integer");
        DEFAULT_THROTTLE_MS
    })
}
