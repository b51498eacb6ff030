#![forbid(unsafe_code)]

use crate::domain::{ArmState, ChangeSource, Presence, is_own_change, parse_state};
use crate::engine::AutoArmEngine;
use crate::error::Error;
use crate::scheduler::TimerTask;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use config::ButtonAction;
use std::time::Duration;
use tracing::{debug, info, warn};

const MOBILE_DISARM: &str = "ALARM_PANEL_DISARM";
const MOBILE_AWAY: &str = "ALARM_PANEL_AWAY";
const MOBILE_RESET: &str = "ALARM_PANEL_RESET";

/// Longest run of missing local time a timezone change can leave.
const MAX_GAP_MINUTES: i64 = 24 * 60;

impl AutoArmEngine {
    pub(crate) async fn on_occupancy_change(
        &mut self,
        occupant: &str,
        old: Option<Presence>,
        new: Option<Presence>,
    ) -> Result<(), Error> {
        if old == new {
            debug!(occupant, ?new, "occupancy unchanged");
            return Ok(());
        }
        debug!(occupant, ?old, ?new, "occupancy changed");

        let delay = new.and_then(|presence| self.config.occupancy.delay.get(&presence).copied());
        match delay {
            Some(delay) => {
                let now = self.now();
                self.schedule_at(
                    now + delay,
                    TimerTask::DelayedReset {
                        source: ChangeSource::Occupancy,
                        intervention: None,
                        requested_at: now,
                    },
                );
            }
            None => {
                self.reset_armed_state(None, Some(ChangeSource::Occupancy))
                    .await?;
            }
        }
        Ok(())
    }

    /// Sunrise recomputes, unless it comes before the configured earliest
    /// time, in which case the recompute waits for that time.
    pub(crate) async fn on_sunrise(&mut self) -> Result<(), Error> {
        let now = self.now();
        match self.sunrise_cutoff(now) {
            Some(at) => {
                debug!(%at, "sunrise before cutoff, rescheduling");
                self.schedule_at(
                    at,
                    TimerTask::DelayedReset {
                        source: ChangeSource::Sunrise,
                        intervention: None,
                        requested_at: now,
                    },
                );
            }
            None => {
                self.reset_armed_state(None, Some(ChangeSource::Sunrise))
                    .await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn on_sunset(&mut self) -> Result<(), Error> {
        self.reset_armed_state(None, Some(ChangeSource::Sunset))
            .await?;
        Ok(())
    }

    pub(crate) async fn on_button(&mut self, entity_id: &str) -> Result<(), Error> {
        let Some((action, delay)) = self.buttons.get(entity_id).copied() else {
            debug!(entity_id, "ignoring unknown button");
            return Ok(());
        };
        info!(entity_id, %action, ?delay, "button pressed");

        match action {
            ButtonAction::Arm(state) => self.on_state_button(state, delay).await,
            ButtonAction::Reset => self.on_reset_button(delay).await?,
        }
        Ok(())
    }

    async fn on_state_button(&mut self, state: ArmState, delay: Option<Duration>) {
        self.record_intervention(ChangeSource::Button, Some(state));
        match delay.filter(|delay| !delay.is_zero()) {
            Some(delay) => {
                let now = self.now();
                self.schedule_at(
                    now + delay,
                    TimerTask::DelayedArm {
                        state,
                        source: ChangeSource::Button,
                        requested_at: now,
                    },
                );
                let current = self.armed_state();
                self.notify(
                    ChangeSource::Button,
                    Some(current),
                    Some(state),
                    Some(format!("Alarm will be set to {state} in {}", format_delay(delay))),
                    Some(format!("Arm set to {state} process starting")),
                )
                .await;
            }
            None => {
                self.arm(Some(state), Some(ChangeSource::Button)).await;
            }
        }
    }

    async fn on_reset_button(&mut self, delay: Option<Duration>) -> Result<(), Error> {
        let intervention = self.record_intervention(ChangeSource::Button, None);
        match delay.filter(|delay| !delay.is_zero()) {
            Some(delay) => {
                let now = self.now();
                self.schedule_at(
                    now + delay,
                    TimerTask::DelayedReset {
                        source: ChangeSource::Button,
                        intervention: Some(intervention),
                        requested_at: now,
                    },
                );
                self.notify(
                    ChangeSource::Button,
                    None,
                    None,
                    Some(format!("Alarm will be reset in {}", format_delay(delay))),
                    Some("Alarm reset wait initiated".to_owned()),
                )
                .await;
            }
            None => {
                let fresh = self.record_intervention(ChangeSource::Button, None);
                self.reset_armed_state(Some(fresh), None).await?;
            }
        }
        Ok(())
    }

    pub(crate) async fn on_mobile_action(&mut self, action: &str) -> Result<(), Error> {
        debug!(action, "mobile action");
        let state = match action {
            MOBILE_DISARM => ArmState::Disarmed,
            MOBILE_AWAY => ArmState::ArmedAway,
            MOBILE_RESET => {
                let intervention = self.record_intervention(ChangeSource::Button, None);
                self.reset_armed_state(Some(intervention), None).await?;
                return Ok(());
            }
            _ => {
                debug!(action, "ignoring mobile action");
                return Ok(());
            }
        };
        self.record_intervention(ChangeSource::Mobile, Some(state));
        self.arm(Some(state), Some(ChangeSource::Mobile)).await;
        Ok(())
    }

    /// The panel changed. Changes the engine made itself are ignored,
    /// anything else counts as an intervention.
    pub(crate) async fn on_panel_change(
        &mut self,
        old: Option<&str>,
        new: Option<&str>,
        changed_by: Option<&str>,
    ) -> Result<(), Error> {
        if is_own_change(changed_by) {
            debug!(?old, ?new, "ignoring own panel change");
            return Ok(());
        }
        info!(?old, ?new, ?changed_by, "panel changed");

        let new_state = parse_state(new);
        let old_state = parse_state(old);
        let zombie = new_state.is_some_and(ArmState::is_zombie);

        self.record_intervention(
            ChangeSource::AlarmPanel,
            new_state.filter(|state| !state.is_zombie()),
        );

        if zombie {
            warn!(?new, "panel lost its state, recomputing");
            self.reset_armed_state(None, Some(ChangeSource::Zombification))
                .await?;
        } else if new != old {
            self.notify(ChangeSource::AlarmPanel, old_state, new_state, None, None)
                .await;
        } else {
            debug!(?new, "panel state unchanged");
        }
        Ok(())
    }

    pub(crate) async fn housekeeping(&mut self) {
        let now = self.now();
        let ttl = self.config.housekeeping.intervention_ttl;
        let pruned = self.ledger.prune(now, ttl);
        debug!(pruned, "housekeeping");

        let ids: Vec<String> = self
            .calendars
            .iter()
            .map(|calendar| calendar.id().to_owned())
            .collect();
        for id in ids {
            if let Err(err) = self.prune_events(&id).await {
                warn!(calendar = %id, %err, "calendar prune failed");
                self.health.record_runtime_error();
            }
        }
    }

    /// Today's earliest allowed sunrise, when `now` comes before it.
    pub fn sunrise_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let earliest = self.config.diurnal.sunrise.earliest?;
        let tz = self.config.timezone;
        let local = now.with_timezone(&tz);
        if local.time() >= earliest {
            return None;
        }
        // Inside a spring-forward gap the cutoff moves to the first local
        // minute that exists.
        let cutoff = local.date_naive().and_time(earliest);
        (0..=MAX_GAP_MINUTES).find_map(|step| {
            tz.from_local_datetime(&(cutoff + TimeDelta::minutes(step)))
                .earliest()
                .map(|at| at.with_timezone(&Utc))
        })
    }
}

/// `H:MM:SS`, e.g. `0:02:00`.
fn format_delay(delay: Duration) -> String {
    let secs = delay.as_secs();
    format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}
