#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of an alarm control panel.
///
/// Only the first six variants are stable; the rest are reported by the
/// panel while it is transitioning or broken and are never chosen by the
/// transition rules.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArmState {
    Disarmed,
    ArmedHome,
    ArmedAway,
    ArmedNight,
    ArmedVacation,
    ArmedCustomBypass,
    Pending,
    Arming,
    Disarming,
    Triggered,
    Unknown,
    Unavailable,
}

impl ArmState {
    pub const ALL: [ArmState; 12] = [
        ArmState::Disarmed,
        ArmState::ArmedHome,
        ArmState::ArmedAway,
        ArmState::ArmedNight,
        ArmState::ArmedVacation,
        ArmState::ArmedCustomBypass,
        ArmState::Pending,
        ArmState::Arming,
        ArmState::Disarming,
        ArmState::Triggered,
        ArmState::Unknown,
        ArmState::Unavailable,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            ArmState::Disarmed => "disarmed",
            ArmState::ArmedHome => "armed_home",
            ArmState::ArmedAway => "armed_away",
            ArmState::ArmedNight => "armed_night",
            ArmState::ArmedVacation => "armed_vacation",
            ArmState::ArmedCustomBypass => "armed_custom_bypass",
            ArmState::Pending => "pending",
            ArmState::Arming => "arming",
            ArmState::Disarming => "disarming",
            ArmState::Triggered => "triggered",
            ArmState::Unknown => "unknown",
            ArmState::Unavailable => "unavailable",
        }
    }

    /// Pending, arming, disarming and triggered.
    pub const fn is_ephemeral(self) -> bool {
        matches!(
            self,
            ArmState::Pending | ArmState::Arming | ArmState::Disarming | ArmState::Triggered
        )
    }

    /// Unknown and unavailable: the panel has lost its state.
    pub const fn is_zombie(self) -> bool {
        matches!(self, ArmState::Unknown | ArmState::Unavailable)
    }

    pub const fn is_stable(self) -> bool {
        !self.is_ephemeral() && !self.is_zombie()
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not an alarm state: {0:?}")]
pub struct UnknownState(pub String);

impl FromStr for ArmState {
    type Err = UnknownState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        ArmState::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownState(s.to_owned()))
    }
}

/// Everything that can cause the engine to consider a state change.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Calendar,
    Mobile,
    Occupancy,
    AlarmPanel,
    Button,
    Action,
    Sunrise,
    Sunset,
    Zombification,
    Startup,
}

impl ChangeSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            ChangeSource::Calendar => "calendar",
            ChangeSource::Mobile => "mobile",
            ChangeSource::Occupancy => "occupancy",
            ChangeSource::AlarmPanel => "alarm_panel",
            ChangeSource::Button => "button",
            ChangeSource::Action => "action",
            ChangeSource::Sunrise => "sunrise",
            ChangeSource::Sunset => "sunset",
            ChangeSource::Zombification => "zombification",
            ChangeSource::Startup => "startup",
        }
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DayPart {
    Day,
    Night,
}

/// Presence value reported for an occupant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Home,
    NotHome,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_any_case() {
        assert_eq!("armed_away".parse::<ArmState>(), Ok(ArmState::ArmedAway));
        assert_eq!("ARMED_NIGHT".parse::<ArmState>(), Ok(ArmState::ArmedNight));
        assert!("armed_sideways".parse::<ArmState>().is_err());
    }

    #[test]
    fn classification_is_disjoint() {
        for state in ArmState::ALL {
            let classes = [state.is_stable(), state.is_ephemeral(), state.is_zombie()];
            assert_eq!(classes.iter().filter(|c| **c).count(), 1, "{state}");
            assert_eq!(state.as_str().parse::<ArmState>(), Ok(state));
        }
    }
}
