#![forbid(unsafe_code)]

use crate::calendar::{PollAction, TrackStatus, TrackedCalendar, TrackedCalendarEvent};
use crate::diagnostics::{CalendarEventRecord, Diagnostic};
use crate::domain::{ArmState, CalendarEvent, ChangeSource};
use crate::engine::AutoArmEngine;
use crate::error::Error;
use crate::host::ConfigIssue;
use crate::scheduler::TimerTask;
use chrono::{DateTime, Utc};
use config::NoEventMode;
use tracing::{debug, info, warn};

impl AutoArmEngine {
    /// Start tracking every configured calendar and run a first poll.
    pub(crate) async fn initialize_calendars(&mut self) {
        for config in self.config.calendar_control.calendars.clone() {
            let (mut calendar, errors) = TrackedCalendar::new(config);
            for err in errors {
                warn!(calendar = %calendar.id(), %err, "calendar pattern disabled");
                self.health.record_initialization_error("calendar");
                self.services.issues.raise(ConfigIssue::new(
                    "calendar_pattern",
                    calendar.id(),
                    err,
                ));
            }

            let token = self.schedule_every(
                calendar.poll_period(),
                TimerTask::CalendarPoll {
                    calendar_id: calendar.id().to_owned(),
                },
            );
            calendar.set_poll_timer(token);
            info!(calendar = %calendar.id(), period = ?calendar.poll_period(), "tracking calendar");
            self.calendars.push(calendar);
        }

        let ids: Vec<String> = self
            .calendars
            .iter()
            .map(|calendar| calendar.id().to_owned())
            .collect();
        for id in ids {
            if let Err(err) = self.match_events(&id).await {
                warn!(calendar = %id, %err, "initial calendar poll failed");
                self.health.record_initialization_error("calendar_setup");
            }
        }
    }

    /// A failed poll is logged and counted, the next one tries again.
    pub(crate) async fn on_calendar_poll(&mut self, calendar_id: &str) {
        let result = match self.match_events(calendar_id).await {
            Ok(()) => self.prune_events(calendar_id).await,
            Err(err) => Err(err),
        };
        if let Err(err) = result {
            warn!(calendar_id, %err, "calendar poll failed");
            self.health.record_runtime_error();
        }
    }

    /// Fetch upcoming events and bring the tracked set in line with them.
    async fn match_events(&mut self, calendar_id: &str) -> Result<(), Error> {
        let now = self.now();
        let Some(calendar) = self.calendar(calendar_id) else {
            debug!(calendar_id, "poll for unknown calendar");
            return Ok(());
        };
        let (start, end) = calendar.poll_window(now);
        let fetched = self
            .services
            .calendars
            .events(calendar_id, start, end)
            .await?;

        let Some(calendar) = self.calendar(calendar_id) else {
            return Ok(());
        };
        let actions = calendar.reconcile(&fetched);
        debug!(calendar_id, fetched = fetched.len(), actions = actions.len(), "calendar polled");

        for action in actions {
            match action {
                PollAction::Track { id, event, state } => {
                    self.track_event(calendar_id, event, state).await?;
                    debug!(%id, %state, "tracking event");
                }
                PollAction::Update { id, event } => {
                    self.update_event(calendar_id, &id, event).await?;
                }
                PollAction::Remove { id } => {
                    info!(%id, "event no longer asks for a state");
                    self.drop_event(calendar_id, &id).await?;
                }
            }
        }
        Ok(())
    }

    async fn track_event(
        &mut self,
        calendar_id: &str,
        event: CalendarEvent,
        state: ArmState,
    ) -> Result<(), Error> {
        let now = self.now();
        let mode = self.config.calendar_control.no_event_mode;
        let previous = self.armed_state();
        let mut tracked =
            TrackedCalendarEvent::new(calendar_id, event, state, mode, Some(previous), now);
        let id = tracked.id.clone();

        if tracked.event.end <= now {
            tracked.status = TrackStatus::Ended;
            self.insert_event(calendar_id, tracked);
            return Ok(());
        }

        let starts_now = tracked.event.start <= now;
        self.schedule_event_timers(&mut tracked, now);
        self.insert_event(calendar_id, tracked);
        if starts_now {
            self.on_calendar_event_start(calendar_id, &id).await?;
        }
        Ok(())
    }

    async fn update_event(
        &mut self,
        calendar_id: &str,
        id: &str,
        event: CalendarEvent,
    ) -> Result<(), Error> {
        let now = self.now();
        let Some(mut tracked) = self
            .calendar_mut(calendar_id)
            .and_then(|calendar| calendar.remove(id))
        else {
            return Ok(());
        };
        debug!(%id, summary = %event.summary, "tracked event changed");

        let was_current = tracked.is_current(now);
        tracked.event = event;
        tracked.cancel_timers();
        if tracked.status != TrackStatus::Ended {
            self.schedule_event_timers(&mut tracked, now);
        }
        let now_current = tracked.is_current(now);
        let pending = tracked.status == TrackStatus::Pending;
        self.insert_event(calendar_id, tracked);

        if was_current && !now_current {
            self.on_calendar_event_end(calendar_id, id).await?;
        } else if now_current && pending {
            self.on_calendar_event_start(calendar_id, id).await?;
        }
        Ok(())
    }

    async fn drop_event(&mut self, calendar_id: &str, id: &str) -> Result<(), Error> {
        let started = self
            .calendar(calendar_id)
            .and_then(|calendar| calendar.get(id))
            .is_some_and(|tracked| tracked.status == TrackStatus::Started);
        if started {
            self.on_calendar_event_end(calendar_id, id).await?;
        } else if let Some(tracked) = self
            .calendar_mut(calendar_id)
            .and_then(|calendar| calendar.get_mut(id))
        {
            tracked.status = TrackStatus::Ended;
        }
        if let Some(calendar) = self.calendar_mut(calendar_id) {
            calendar.remove(id);
        }
        Ok(())
    }

    /// The event began: arm whatever it asks for.
    pub(crate) async fn on_calendar_event_start(
        &mut self,
        calendar_id: &str,
        id: &str,
    ) -> Result<(), Error> {
        let Some(tracked) = self
            .calendar_mut(calendar_id)
            .and_then(|calendar| calendar.get_mut(id))
        else {
            debug!(%id, "start of untracked event");
            return Ok(());
        };
        if tracked.status == TrackStatus::Ended {
            return Ok(());
        }
        tracked.status = TrackStatus::Started;
        let state = tracked.arming_state;
        let event = tracked.event.clone();
        info!(%id, summary = %event.summary, %state, "calendar event started");

        let new_state = self.arm(Some(state), Some(ChangeSource::Calendar)).await;
        self.services
            .diagnostics
            .publish(Diagnostic::LastCalendarEvent(CalendarEventRecord {
                calendar: calendar_id.to_owned(),
                summary: event.summary,
                description: event.description,
                uid: event.uid,
                start: event.start,
                end: event.end,
                new_state,
            }));
        Ok(())
    }

    /// The event is over. Once no other event holds the panel, fall back
    /// to what the no-event mode asks for.
    pub(crate) async fn on_calendar_event_end(
        &mut self,
        calendar_id: &str,
        id: &str,
    ) -> Result<(), Error> {
        let Some(tracked) = self
            .calendar_mut(calendar_id)
            .and_then(|calendar| calendar.get_mut(id))
        else {
            debug!(%id, "end of untracked event");
            return Ok(());
        };
        tracked.status = TrackStatus::Ended;
        tracked.cancel_timers();
        let mode = tracked.no_event_mode;
        let previous = tracked.previous_state;
        info!(%id, summary = %tracked.event.summary, "calendar event ended");

        if self.has_active_calendar_event() {
            debug!("another calendar event still active");
            return Ok(());
        }

        match mode {
            NoEventMode::Auto => {
                self.pending_state(Some(ChangeSource::Calendar)).await;
                self.reset_armed_state(None, Some(ChangeSource::Calendar))
                    .await?;
            }
            NoEventMode::Fixed(state) => {
                self.arm(Some(state), Some(ChangeSource::Calendar)).await;
            }
            NoEventMode::Manual => {
                self.arm(previous, Some(ChangeSource::Calendar)).await;
            }
        }
        Ok(())
    }

    /// End and forget events that are over, then forget events deleted
    /// from the calendar since they were tracked.
    pub(crate) async fn prune_events(&mut self, calendar_id: &str) -> Result<(), Error> {
        let now = self.now();
        let Some(calendar) = self.calendar(calendar_id) else {
            return Ok(());
        };
        let expired = calendar.expired(now);

        for id in &expired {
            let ended = self
                .calendar(calendar_id)
                .and_then(|calendar| calendar.get(id))
                .is_none_or(|tracked| tracked.status == TrackStatus::Ended);
            if !ended {
                self.on_calendar_event_end(calendar_id, id).await?;
            }
            if let Some(calendar) = self.calendar_mut(calendar_id) {
                calendar.remove(id);
            }
        }
        if !expired.is_empty() {
            debug!(calendar_id, pruned = expired.len(), "expired events pruned");
        }

        let Some((start, end)) = self
            .calendar(calendar_id)
            .and_then(TrackedCalendar::tracked_span)
        else {
            return Ok(());
        };
        let live = self
            .services
            .calendars
            .events(calendar_id, start, end)
            .await?;
        let deleted = self
            .calendar(calendar_id)
            .map(|calendar| calendar.deleted(&live))
            .unwrap_or_default();
        for id in deleted {
            info!(%id, "event deleted from calendar");
            self.drop_event(calendar_id, &id).await?;
        }
        Ok(())
    }

    fn schedule_event_timers(&self, tracked: &mut TrackedCalendarEvent, now: DateTime<Utc>) {
        if tracked.status == TrackStatus::Pending && tracked.event.start > now {
            let token = self.schedule_at(
                tracked.event.start,
                TimerTask::CalendarEventStart {
                    calendar_id: tracked.calendar_id.clone(),
                    event_id: tracked.id.clone(),
                },
            );
            tracked.set_start_timer(token);
        }
        if tracked.event.end > now {
            let token = self.schedule_at(
                tracked.event.end,
                TimerTask::CalendarEventEnd {
                    calendar_id: tracked.calendar_id.clone(),
                    event_id: tracked.id.clone(),
                },
            );
            tracked.set_end_timer(token);
        }
    }

    fn insert_event(&mut self, calendar_id: &str, tracked: TrackedCalendarEvent) {
        if let Some(calendar) = self.calendar_mut(calendar_id) {
            calendar.insert(tracked);
        }
    }

    fn calendar(&self, calendar_id: &str) -> Option<&TrackedCalendar> {
        self.calendars
            .iter()
            .find(|calendar| calendar.id() == calendar_id)
    }

    fn calendar_mut(&mut self, calendar_id: &str) -> Option<&mut TrackedCalendar> {
        self.calendars
            .iter_mut()
            .find(|calendar| calendar.id() == calendar_id)
    }
}
