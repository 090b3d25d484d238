//! Router configuration

use serde::{Deserialize, Serialize};

/// Dispatch and driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Worker threads running subscribed calls
    pub pool_size: usize,
    /// Latencies kept per subscribed call
    pub stats_window: usize,
    /// Messages kept per input for diagnostics
    pub history_size: usize,
    /// Worker threads of the driver runtime (UDP listeners, timers)
    pub driver_threads: usize,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            pool_size: 100,
            stats_window: 20,
            history_size: 200,
            driver_threads: 2,
        }
    }
}

impl RouterConfig {
    /// Reject settings the router can't run with
    pub fn validate(&self) -> crate::Result<()> {
        if self.pool_size == 0 {
            return Err(crate::RouterError::Config(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.driver_threads == 0 {
            return Err(crate::RouterError::Config(
                "driver_threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
