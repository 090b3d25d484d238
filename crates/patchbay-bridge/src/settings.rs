//! Bridge settings
//!
//! Settings travel with the [`AppContext`]. Device ports read them when they
//! are declared, so changes apply to ports declared afterwards.

use patchbay_router::AppContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    /// Client name announced to the MIDI backend
    pub midi_client_name: String,
    /// Default wait for OSC query responses
    pub query_timeout_ms: u64,
    /// MIDI device polling interval of the ports watcher
    pub watcher_interval_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            midi_client_name: "patchbay".to_string(),
            query_timeout_ms: 2000,
            watcher_interval_ms: 1000,
        }
    }
}

impl BridgeSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn watcher_interval(&self) -> Duration {
        Duration::from_millis(self.watcher_interval_ms.max(1))
    }

    /// Attach to `ctx`, replacing the settings it carried
    pub fn apply(self, ctx: &AppContext) {
        ctx.insert_extension(self);
    }

    /// Settings attached to `ctx`, the defaults if none were
    pub fn of(ctx: &AppContext) -> Self {
        ctx.extension::<Self>().unwrap_or_default()
    }
}
