#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RateLimit {
    /// Sliding window in seconds.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub period: Duration,

    /// Arm attempts allowed inside one window.
    pub max_calls: usize,
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(60),
            max_calls: 6,
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Housekeeping {
    /// How often stale interventions and calendar events are pruned.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub interval: Duration,

    /// How long an intervention keeps suppressing automatic changes.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub intervention_ttl: Duration,
}

impl Default for Housekeeping {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
            intervention_ttl: Duration::from_secs(60 * 60),
        }
    }
}
