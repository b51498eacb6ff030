#![forbid(unsafe_code)]

use crate::states::{ArmState, DayPart, Presence};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, OneOrMany, serde_as};
use std::collections::BTreeMap;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Occupancy {
    /// Occupant entities. Anyone `home` makes the house occupied.
    #[serde_as(as = "OneOrMany<_>")]
    pub entity_id: Vec<String>,

    /// State to use for an occupied house, per part of the day.
    pub default_state: BTreeMap<DayPart, ArmState>,

    /// Seconds to wait after an occupant becomes `home`/`not_home` before
    /// recomputing.
    #[serde_as(as = "BTreeMap<_, DurationSeconds<u64>>")]
    pub delay: BTreeMap<Presence, Duration>,
}

impl Default for Occupancy {
    fn default() -> Self {
        Self {
            entity_id: Vec::new(),
            default_state: BTreeMap::from([(DayPart::Day, ArmState::ArmedHome)]),
            delay: BTreeMap::new(),
        }
    }
}
