#![forbid(unsafe_code)]

use crate::domain::{ArmState, CalendarEvent, DayPart};
use std::collections::{BTreeMap, BTreeSet};

/// Point-in-time facts used to decide on a state. Built fresh for every
/// decision and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub occupied: bool,
    pub night: bool,
    pub current_state: ArmState,
    pub active_calendar_event: Option<CalendarEvent>,
    pub occupied_defaults: BTreeMap<DayPart, ArmState>,
    pub at_home: BTreeSet<String>,
    pub not_home: BTreeSet<String>,
}

/// Type of a named fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Bool,
    State,
    Set,
}

/// Value of a named fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactValue<'a> {
    Bool(bool),
    State(ArmState),
    Set(&'a BTreeSet<String>),
}

impl FactValue<'_> {
    pub fn kind(&self) -> FactKind {
        match self {
            FactValue::Bool(_) => FactKind::Bool,
            FactValue::State(_) => FactKind::State,
            FactValue::Set(_) => FactKind::Set,
        }
    }
}

/// Every fact a transition condition can refer to.
pub const FACTS: &[(&str, FactKind)] = &[
    ("occupied", FactKind::Bool),
    ("night", FactKind::Bool),
    ("daytime", FactKind::Bool),
    ("vacation", FactKind::Bool),
    ("bypass", FactKind::Bool),
    ("manual", FactKind::Bool),
    ("disarmed", FactKind::Bool),
    ("computed", FactKind::Bool),
    ("calendar_event", FactKind::Bool),
    ("state", FactKind::State),
    ("occupied_daytime_state", FactKind::State),
    ("occupied_night_state", FactKind::State),
    ("at_home", FactKind::Set),
    ("not_home", FactKind::Set),
];

pub fn fact_kind(name: &str) -> Option<FactKind> {
    FACTS
        .iter()
        .find_map(|(fact, kind)| (*fact == name).then_some(*kind))
}

impl Snapshot {
    pub fn daytime(&self) -> bool {
        !self.night
    }

    pub fn vacation(&self) -> bool {
        self.current_state == ArmState::ArmedVacation
    }

    pub fn bypass(&self) -> bool {
        self.current_state == ArmState::ArmedCustomBypass
    }

    pub fn manual(&self) -> bool {
        self.vacation() || self.bypass()
    }

    pub fn disarmed(&self) -> bool {
        self.current_state == ArmState::Disarmed
    }

    /// Neither a calendar event nor a manual override is in charge.
    pub fn computed(&self) -> bool {
        self.active_calendar_event.is_none() && !self.manual()
    }

    pub fn occupied_daytime_state(&self) -> ArmState {
        self.occupied_defaults
            .get(&DayPart::Day)
            .copied()
            .unwrap_or(ArmState::ArmedHome)
    }

    pub fn occupied_night_state(&self) -> ArmState {
        self.occupied_defaults
            .get(&DayPart::Night)
            .copied()
            .unwrap_or(ArmState::ArmedNight)
    }

    pub fn fact(&self, name: &str) -> Option<FactValue<'_>> {
        let value = match name {
            "occupied" => FactValue::Bool(self.occupied),
            "night" => FactValue::Bool(self.night),
            "daytime" => FactValue::Bool(self.daytime()),
            "vacation" => FactValue::Bool(self.vacation()),
            "bypass" => FactValue::Bool(self.bypass()),
            "manual" => FactValue::Bool(self.manual()),
            "disarmed" => FactValue::Bool(self.disarmed()),
            "computed" => FactValue::Bool(self.computed()),
            "calendar_event" => FactValue::Bool(self.active_calendar_event.is_some()),
            "state" => FactValue::State(self.current_state),
            "occupied_daytime_state" => FactValue::State(self.occupied_daytime_state()),
            "occupied_night_state" => FactValue::State(self.occupied_night_state()),
            "at_home" => FactValue::Set(&self.at_home),
            "not_home" => FactValue::Set(&self.not_home),
            _ => return None,
        };
        Some(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: ArmState) -> Snapshot {
        Snapshot {
            occupied: true,
            night: false,
            current_state: state,
            active_calendar_event: None,
            occupied_defaults: BTreeMap::new(),
            at_home: BTreeSet::new(),
            not_home: BTreeSet::new(),
        }
    }

    #[test]
    fn override_states_are_not_computed() {
        assert!(snapshot(ArmState::ArmedHome).computed());
        assert!(!snapshot(ArmState::ArmedVacation).computed());
        assert!(!snapshot(ArmState::ArmedCustomBypass).computed());
        assert!(snapshot(ArmState::ArmedCustomBypass).manual());
    }

    #[test]
    fn every_listed_fact_resolves_with_its_kind() {
        let snap = snapshot(ArmState::Disarmed);
        for (name, kind) in FACTS {
            assert_eq!(snap.fact(name).map(|v| v.kind()), Some(*kind), "{name}");
        }
        assert_eq!(snap.fact("weather"), None);
        assert_eq!(snap.occupied_daytime_state(), ArmState::ArmedHome);
    }
}
