#![forbid(unsafe_code)]

use crate::diagnostics::{CalculationRecord, Diagnostic};
use crate::domain::{
    ArmState, CalendarEvent, ChangeSource, Intervention, Presence, SunPosition, parse_state,
};
use crate::engine::AutoArmEngine;
use crate::error::Error;
use crate::snapshot::Snapshot;
use config::NoEventMode;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Working notes of one recompute, published once it is over.
#[derive(Debug, Default)]
struct Calculation {
    old: Option<ArmState>,
    new: Option<ArmState>,
    must_change: bool,
    active_calendar_event: Option<CalendarEvent>,
    last_state_intervention: Option<Intervention>,
}

impl AutoArmEngine {
    /// Work out the state the panel should be in and move it there.
    ///
    /// Returns the panel state the recompute settled on, which is the
    /// existing state when something blocked the recompute.
    pub async fn reset_armed_state(
        &mut self,
        intervention: Option<Intervention>,
        source: Option<ChangeSource>,
    ) -> Result<Option<ArmState>, Error> {
        let source = source.or(intervention.as_ref().map(|i| i.source));
        debug!(?intervention, ?source, "reset armed state");

        let mut calc = Calculation::default();
        let result = self
            .recompute(intervention.as_ref(), source, &mut calc)
            .await;

        let record = CalculationRecord {
            changed: calc.new.is_some() && calc.new != calc.old,
            old: calc.old,
            new: calc.new,
            source,
            active_calendar_event: calc.active_calendar_event,
            occupied: Some(self.is_occupied()),
            night: Some(self.is_night()),
            must_change: calc.must_change,
            last_state_intervention: calc.last_state_intervention,
            intervention,
            time: self.now(),
            error: result.as_ref().err().map(ToString::to_string),
        };
        self.services
            .diagnostics
            .publish(Diagnostic::LastCalculation(record));

        result
    }

    async fn recompute(
        &mut self,
        intervention: Option<&Intervention>,
        source: Option<ChangeSource>,
        calc: &mut Calculation,
    ) -> Result<Option<ArmState>, Error> {
        let existing = self.armed_state();
        calc.old = Some(existing);
        calc.new = Some(existing);

        if !self.calendars.is_empty() {
            calc.active_calendar_event = self.active_calendar_event();
            if calc.active_calendar_event.is_some() {
                debug!("calendar event active, keeping state");
                return Ok(calc.new);
            }
            match self.config.calendar_control.no_event_mode {
                NoEventMode::Manual => {
                    debug!("no calendar event and manual mode, keeping state");
                    return Ok(calc.new);
                }
                NoEventMode::Fixed(state) => {
                    debug!(%state, "no calendar event, applying fixed state");
                    calc.new = self
                        .arm(Some(state), Some(ChangeSource::Calendar))
                        .await
                        .or_else(|| Some(self.armed_state()));
                    return Ok(calc.new);
                }
                NoEventMode::Auto => debug!("no calendar event, computing state"),
            }
        }

        calc.must_change = existing == ArmState::Pending || existing.is_zombie();
        let explicit = intervention.is_some()
            || matches!(
                source,
                Some(ChangeSource::Calendar | ChangeSource::Occupancy)
            );
        if explicit || calc.must_change {
            debug!("ignoring previous interventions");
        } else if let Some(last) = self.ledger.last_state_intervention() {
            debug!(
                state = ?last.state,
                source = %last.source,
                at = %last.created_at,
                "keeping state chosen by an earlier intervention"
            );
            calc.last_state_intervention = Some(last.clone());
            return Ok(calc.new);
        }

        let determined = self.determine_state()?;
        calc.new = determined;
        if let Some(state) = determined
            && state != ArmState::Pending
            && state != existing
        {
            calc.new = self
                .arm(Some(state), source)
                .await
                .or_else(|| Some(self.armed_state()));
        }
        Ok(calc.new)
    }

    /// First transition rule that holds right now.
    pub fn determine_state(&self) -> Result<Option<ArmState>, Error> {
        let snapshot = self.snapshot();
        let state = self.rules.determine(&snapshot)?;
        debug!(?state, "computed state");
        Ok(state)
    }

    pub fn snapshot(&self) -> Snapshot {
        let (at_home, not_home) = self.occupants();
        Snapshot {
            occupied: !at_home.is_empty(),
            night: self.is_night(),
            current_state: self.armed_state(),
            active_calendar_event: self.active_calendar_event(),
            occupied_defaults: self.config.occupancy.default_state.clone(),
            at_home,
            not_home,
        }
    }

    /// Current panel state. A missing or unreadable panel counts as
    /// pending.
    pub fn armed_state(&self) -> ArmState {
        let reading = self
            .services
            .world
            .panel(&self.config.alarm_panel.entity_id);
        match parse_state(reading.as_ref().map(|r| r.state.as_str())) {
            Some(state) => state,
            None => {
                warn!("no alarm state available, treating as pending");
                ArmState::Pending
            }
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.config.occupancy.entity_id.iter().any(|occupant| {
            self.services.world.presence(occupant) == Some(Presence::Home)
        })
    }

    pub fn is_night(&self) -> bool {
        self.services.world.sun() == Some(SunPosition::BelowHorizon)
    }

    /// Occupants split into home and anything else.
    fn occupants(&self) -> (BTreeSet<String>, BTreeSet<String>) {
        self.config
            .occupancy
            .entity_id
            .iter()
            .cloned()
            .partition(|occupant| self.services.world.presence(occupant) == Some(Presence::Home))
    }

    pub fn has_active_calendar_event(&self) -> bool {
        let now = self.now();
        self.calendars
            .iter()
            .any(|calendar| calendar.has_active_event(now))
    }

    /// First active event across all calendars.
    pub fn active_calendar_event(&self) -> Option<CalendarEvent> {
        let now = self.now();
        self.calendars
            .iter()
            .flat_map(|calendar| calendar.active_events(now))
            .next()
            .cloned()
    }
}
