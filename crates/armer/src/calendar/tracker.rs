#![forbid(unsafe_code)]

use crate::calendar::matcher::{PatternError, StateMatcher};
use crate::calendar::tracked::TrackedCalendarEvent;
use crate::domain::{ArmState, CalendarEvent};
use chrono::{DateTime, Utc};
use config::CalendarConfig;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// How far back a poll looks, so events that began just before are seen.
const LOOK_BEHIND: Duration = Duration::from_secs(15 * 60);
/// Slack past the next poll.
const LOOK_AHEAD_SLACK: Duration = Duration::from_secs(5 * 60);

/// What a poll found out about one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollAction {
    /// A new event asking for `state`.
    Track {
        id: String,
        event: CalendarEvent,
        state: ArmState,
    },
    /// A tracked event whose details changed.
    Update { id: String, event: CalendarEvent },
    /// A tracked event that no longer asks for any state.
    Remove { id: String },
}

/// One calendar and the events it is currently tracking.
#[derive(Debug)]
pub struct TrackedCalendar {
    config: CalendarConfig,
    matcher: StateMatcher,
    events: BTreeMap<String, TrackedCalendarEvent>,
    poll_timer: Option<CancellationToken>,
}

impl TrackedCalendar {
    pub fn new(config: CalendarConfig) -> (Self, Vec<PatternError>) {
        let (matcher, errors) = StateMatcher::compile(&config.state_patterns);
        let calendar = Self {
            config,
            matcher,
            events: BTreeMap::new(),
            poll_timer: None,
        };
        (calendar, errors)
    }

    pub fn id(&self) -> &str {
        &self.config.entity_id
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    pub fn poll_period(&self) -> Duration {
        self.config.poll_period()
    }

    /// Range fetched by a regular poll.
    pub fn poll_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (
            now - LOOK_BEHIND,
            now + self.poll_period() + LOOK_AHEAD_SLACK,
        )
    }

    pub fn match_event(&self, event: &CalendarEvent) -> Option<ArmState> {
        self.matcher
            .match_event(&event.summary, event.description.as_deref())
    }

    /// Compare freshly fetched events with the tracked ones.
    pub fn reconcile(&self, fetched: &[CalendarEvent]) -> Vec<PollAction> {
        let mut actions = Vec::new();
        let mut seen = BTreeSet::new();

        for event in fetched {
            let id = event.tracking_id(self.id());
            if !seen.insert(id.clone()) {
                continue;
            }
            let tracked = self.events.get(&id);
            match (self.match_event(event), tracked) {
                (None, Some(_)) => actions.push(PollAction::Remove { id }),
                (None, None) => debug!(summary = %event.summary, "ignoring unmatched event"),
                (Some(state), None) => actions.push(PollAction::Track {
                    id,
                    event: event.clone(),
                    state,
                }),
                (Some(_), Some(existing)) if existing.event != *event => {
                    actions.push(PollAction::Update {
                        id,
                        event: event.clone(),
                    });
                }
                (Some(_), Some(_)) => debug!(%id, "tracked event unchanged"),
            }
        }

        actions
    }

    pub fn has_active_event(&self, now: DateTime<Utc>) -> bool {
        self.events.values().any(|tracked| tracked.is_current(now))
    }

    pub fn active_events(&self, now: DateTime<Utc>) -> Vec<&CalendarEvent> {
        self.events
            .values()
            .filter(|tracked| tracked.is_current(now))
            .map(|tracked| &tracked.event)
            .collect()
    }

    /// Tracked events that are neither running nor still to come.
    pub fn expired(&self, now: DateTime<Utc>) -> Vec<String> {
        self.events
            .iter()
            .filter(|(_, tracked)| !tracked.is_current(now) && !tracked.is_future(now))
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Earliest start and latest end over every tracked event.
    pub fn tracked_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = self.events.values().map(|tracked| tracked.event.start).min()?;
        let end = self.events.values().map(|tracked| tracked.event.end).max()?;
        Some((start, end))
    }

    /// Tracked events missing from a fetch covering [`Self::tracked_span`].
    pub fn deleted(&self, live: &[CalendarEvent]) -> Vec<String> {
        let live: BTreeSet<String> = live
            .iter()
            .map(|event| event.tracking_id(self.id()))
            .collect();
        self.events
            .keys()
            .filter(|id| !live.contains(*id))
            .cloned()
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&TrackedCalendarEvent> {
        self.events.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut TrackedCalendarEvent> {
        self.events.get_mut(id)
    }

    pub fn insert(&mut self, tracked: TrackedCalendarEvent) {
        self.events.insert(tracked.id.clone(), tracked);
    }

    pub fn remove(&mut self, id: &str) -> Option<TrackedCalendarEvent> {
        self.events.remove(id)
    }

    pub fn events(&self) -> impl Iterator<Item = &TrackedCalendarEvent> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn set_poll_timer(&mut self, token: CancellationToken) {
        if let Some(old) = self.poll_timer.replace(token) {
            old.cancel();
        }
    }

    /// Stop polling and forget every event along with its timers.
    pub fn shutdown(&mut self) {
        if let Some(token) = self.poll_timer.take() {
            token.cancel();
        }
        self.events.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::tracked::TrackStatus;
    use chrono::TimeZone;
    use config::NoEventMode;
    use pretty_assertions::assert_eq;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 1, hour, 0, 0).unwrap()
    }

    fn calendar() -> TrackedCalendar {
        TrackedCalendar::new(CalendarConfig::new("calendar.family")).0
    }

    fn track(calendar: &mut TrackedCalendar, event: CalendarEvent, state: ArmState) {
        let tracked = TrackedCalendarEvent::new(
            calendar.id(),
            event,
            state,
            NoEventMode::Auto,
            None,
            at(0),
        );
        calendar.insert(tracked);
    }

    #[test]
    fn poll_window_spans_back_and_ahead() {
        let calendar = calendar();
        let (start, end) = calendar.poll_window(at(12));
        assert_eq!(start, at(12) - Duration::from_secs(900));
        assert_eq!(end, at(12) + Duration::from_secs(20 * 60));
    }

    #[test]
    fn reconcile_sorts_events_into_actions() {
        let mut calendar = calendar();
        let away = CalendarEvent::new("Away", at(9), at(17)).with_uid("away");
        let night = CalendarEvent::new("Night shift", at(20), at(23)).with_uid("night");
        let dentist = CalendarEvent::new("Dentist", at(10), at(11)).with_uid("dentist");
        track(&mut calendar, away.clone(), ArmState::ArmedAway);
        track(&mut calendar, night.clone(), ArmState::ArmedNight);

        let moved = CalendarEvent::new("Away", at(9), at(18)).with_uid("away");
        let renamed = CalendarEvent::new("Late shift", at(20), at(23)).with_uid("night");
        let holiday = CalendarEvent::new("Holiday", at(0), at(23)).with_uid("holiday");

        let actions = calendar.reconcile(&[
            moved.clone(),
            renamed,
            dentist,
            holiday.clone(),
            holiday.clone(),
        ]);
        assert_eq!(
            actions,
            vec![
                PollAction::Update {
                    id: "calendar.family:away".into(),
                    event: moved
                },
                PollAction::Remove {
                    id: "calendar.family:night".into()
                },
                PollAction::Track {
                    id: "calendar.family:holiday".into(),
                    event: holiday,
                    state: ArmState::ArmedVacation
                },
            ]
        );
        assert!(calendar.reconcile(&[away]).is_empty());
    }

    #[test]
    fn finds_expired_and_deleted_events() {
        let mut calendar = calendar();
        let morning = CalendarEvent::new("Away", at(8), at(9)).with_uid("m");
        let evening = CalendarEvent::new("Away", at(18), at(20)).with_uid("e");
        let no_uid = CalendarEvent::new("Away", at(10), at(12));
        track(&mut calendar, morning, ArmState::ArmedAway);
        track(&mut calendar, evening.clone(), ArmState::ArmedAway);
        track(&mut calendar, no_uid.clone(), ArmState::ArmedAway);

        assert!(calendar.has_active_event(at(11)));
        assert_eq!(calendar.active_events(at(11)), vec![&no_uid]);
        assert_eq!(calendar.expired(at(11)), vec!["calendar.family:m".to_owned()]);
        assert_eq!(calendar.tracked_span(), Some((at(8), at(20))));
        assert_eq!(
            calendar.deleted(&[evening, no_uid]),
            vec!["calendar.family:m".to_owned()]
        );

        calendar.get_mut("calendar.family:e").unwrap().status = TrackStatus::Ended;
        assert_eq!(calendar.expired(at(11)).len(), 2);
    }
}
