#![forbid(unsafe_code)]

use crate::domain::{ArmState, CalendarEvent};
use chrono::{DateTime, Utc};
use config::NoEventMode;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackStatus {
    Pending,
    Started,
    Ended,
}

/// A calendar event that asks for an alarm state, plus the timers that
/// act on its start and end.
#[derive(Debug)]
pub struct TrackedCalendarEvent {
    pub id: String,
    pub calendar_id: String,
    pub event: CalendarEvent,
    pub arming_state: ArmState,
    pub no_event_mode: NoEventMode,
    /// Panel state when tracking began, restored in manual mode.
    pub previous_state: Option<ArmState>,
    pub status: TrackStatus,
    pub tracked_at: DateTime<Utc>,
    start_timer: Option<CancellationToken>,
    end_timer: Option<CancellationToken>,
}

impl TrackedCalendarEvent {
    pub fn new(
        calendar_id: &str,
        event: CalendarEvent,
        arming_state: ArmState,
        no_event_mode: NoEventMode,
        previous_state: Option<ArmState>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: event.tracking_id(calendar_id),
            calendar_id: calendar_id.to_owned(),
            event,
            arming_state,
            no_event_mode,
            previous_state,
            status: TrackStatus::Pending,
            tracked_at: now,
            start_timer: None,
            end_timer: None,
        }
    }

    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.status != TrackStatus::Ended && self.event.contains(now)
    }

    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.status != TrackStatus::Ended && self.event.start > now
    }

    pub fn set_start_timer(&mut self, token: CancellationToken) {
        if let Some(old) = self.start_timer.replace(token) {
            old.cancel();
        }
    }

    pub fn set_end_timer(&mut self, token: CancellationToken) {
        if let Some(old) = self.end_timer.replace(token) {
            old.cancel();
        }
    }

    pub fn cancel_timers(&mut self) {
        for token in [self.start_timer.take(), self.end_timer.take()]
            .into_iter()
            .flatten()
        {
            token.cancel();
        }
    }

    pub fn has_timers(&self) -> bool {
        self.start_timer.is_some() || self.end_timer.is_some()
    }
}

impl Drop for TrackedCalendarEvent {
    fn drop(&mut self) {
        self.cancel_timers();
    }
}
