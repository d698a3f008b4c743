use std::time::Duration;

use crate::error::{Error, Result};

/// How often replicas ping and the failure detector ticks.
pub const PING_INTERVAL: Duration = Duration::from_millis(100);

/// Missed ping intervals after which a replica is presumed dead.
pub const DEAD_PINGS: u64 = 5;

/// Timing of the view service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Period of the failure detector; replicas should ping at this rate.
    pub ping_interval: Duration,
    /// Ticks without a ping before the primary or backup is declared dead.
    pub dead_pings: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ping_interval: PING_INTERVAL,
            dead_pings: DEAD_PINGS,
        }
    }
}

impl Config {
    /// Rejects settings the failure detector cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.ping_interval == Duration::from_millis(0) {
            return Err(Error::InvalidConfig("ping interval must be non-zero".into()));
        }
        if self.dead_pings == 0 {
            return Err(Error::InvalidConfig("dead pings must be non-zero".into()));
        }
        Ok(())
    }
}
