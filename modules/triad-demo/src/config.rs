use std::env;
use std::fmt::Display;
use std::str::FromStr;

use anyhow::{anyhow, ensure, Result};
use tracing::info;
use triad_events::BusConfig;

/// Demo configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct DemoConfig {
    pub bus: BusConfig,

    /// Edits requested from the views, round-robin.
    pub edits: usize,

    /// Mirrors subscribed to the controller.
    pub views: usize,
}

impl DemoConfig {
    /// Reads `TRIAD_DEMO_EDITS` (default 5) and `TRIAD_DEMO_VIEWS` (default 2)
    /// on top of the bus settings.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            bus: BusConfig::from_env(),
            edits: parse_or("TRIAD_DEMO_EDITS", env::var("TRIAD_DEMO_EDITS").ok(), 5)?,
            views: parse_or("TRIAD_DEMO_VIEWS", env::var("TRIAD_DEMO_VIEWS").ok(), 2)?,
        };
        ensure!(config.views > 0, "TRIAD_DEMO_VIEWS must be at least 1");
        Ok(config)
    }

    pub fn log(&self) {
        info!(
            throttle_ms = self.bus.throttle_delay.as_millis() as u64,
            edits = self.edits,
            views = self.views,
            "Demo configuration"
        );
    }
}

fn parse_or<T>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow!("{key} must be a number, got {raw:?}: {e}")),
    }
}
