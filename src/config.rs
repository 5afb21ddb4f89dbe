//! Typed configuration for the sharing subsystem.
//!
//! Follows the same `Option<T>` + accessor pattern used throughout the
//! surrounding config crate: every field is optional on the wire so a
//! deployment only needs to override what it cares about, and a method
//! of the same name returns the effective value with its default baked
//! in, rather than scattering `#[serde(default = "...")]` across fields.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, Default, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProxySharing {
    /// Seconds to wait between re-claim attempts while a proxy has no seat.
    pub wait_unit_seconds: Option<u64>,
    /// Maximum number of re-claim attempts before `startProxy` fails.
    pub max_attempts: Option<u32>,
    /// How long a pending claim may sit unclaimed before it is evicted,
    /// in milliseconds.
    pub pending_claim_ttl_ms: Option<u64>,
}

impl ProxySharing {
    pub fn wait_unit(&self) -> Duration {
        Duration::from_secs(self.wait_unit_seconds.unwrap_or(3))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts.unwrap_or(600)
    }

    pub fn pending_claim_ttl(&self) -> Duration {
        Duration::from_millis(self.pending_claim_ttl_ms.unwrap_or(10 * 60 * 1000))
    }
}
