#![forbid(unsafe_code)]

use crate::states::ArmState;
use serde::{Deserialize, Serialize};
use serde_with::{OneOrMany, serde_as};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// What to do once no calendar event is active any more.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(try_from = "String", into = "String")]
pub enum NoEventMode {
    /// Recompute the state from occupancy and daylight.
    #[default]
    Auto,
    /// Go back to whatever the panel was before the event started.
    Manual,
    /// Always fall back to this state.
    Fixed(ArmState),
}

impl FromStr for NoEventMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            other => other
                .parse::<ArmState>()
                .map(Self::Fixed)
                .map_err(|_| format!("`{s}` is not auto, manual or an alarm state")),
        }
    }
}

impl TryFrom<String> for NoEventMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NoEventMode> for String {
    fn from(value: NoEventMode) -> Self {
        value.to_string()
    }
}

impl fmt::Display for NoEventMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Manual => f.write_str("manual"),
            Self::Fixed(state) => write!(f, "{state}"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CalendarControl {
    pub no_event_mode: NoEventMode,
    pub calendars: Vec<CalendarConfig>,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CalendarConfig {
    pub entity_id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Poll interval in minutes.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Regular expressions matched against event summary and description.
    #[serde(default = "default_state_patterns")]
    #[serde_as(as = "BTreeMap<_, OneOrMany<_>>")]
    pub state_patterns: BTreeMap<ArmState, Vec<String>>,
}

impl CalendarConfig {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            alias: None,
            poll_interval: default_poll_interval(),
            state_patterns: default_state_patterns(),
        }
    }

    /// Poll period, never shorter than a minute.
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval.max(1) * 60)
    }
}

fn default_poll_interval() -> u64 {
    15
}

pub fn default_state_patterns() -> BTreeMap<ArmState, Vec<String>> {
    BTreeMap::from([
        (ArmState::ArmedAway, vec!["Away".to_owned()]),
        (ArmState::Disarmed, vec!["Disarmed".to_owned()]),
        (ArmState::ArmedHome, vec!["Home".to_owned()]),
        (
            ArmState::ArmedVacation,
            vec!["Vacation".to_owned(), "Holiday".to_owned()],
        ),
        (ArmState::ArmedNight, vec!["Night".to_owned()]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_event_mode_accepts_states_and_keywords() {
        assert_eq!("AUTO".parse::<NoEventMode>(), Ok(NoEventMode::Auto));
        assert_eq!("manual".parse::<NoEventMode>(), Ok(NoEventMode::Manual));
        assert_eq!(
            "Armed_Away".parse::<NoEventMode>(),
            Ok(NoEventMode::Fixed(ArmState::ArmedAway))
        );
        assert!("sometimes".parse::<NoEventMode>().is_err());
    }
}
