#![forbid(unsafe_code)]

use crate::diagnostics::{CalculationRecord, Diagnostic};
use crate::domain::{ArmState, CalendarEvent, PanelReading, Presence, SunPosition};
use crate::host::{
    CalendarSource, ConfigIssue, DiagnosticsSink, HostError, IssueReporter, NotificationSink,
    PanelWriter, WorldStateReader,
};
use crate::notify::Notification;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Inner {
    panels: BTreeMap<String, PanelReading>,
    presence: BTreeMap<String, Presence>,
    sun: Option<SunPosition>,
    calendars: BTreeMap<String, Vec<CalendarEvent>>,
    offline_calendars: BTreeSet<String>,
    fail_panel_writes: bool,
    panel_writes: Vec<(String, ArmState, String)>,
    notifications: Vec<Notification>,
    issues: Vec<ConfigIssue>,
    diagnostics: Vec<Diagnostic>,
}

/// A home kept entirely in memory. Used by the simulator and tests.
#[derive(Debug, Default)]
pub struct MemoryHome {
    inner: Mutex<Inner>,
}

impl MemoryHome {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the panel as if somebody outside the engine changed it.
    pub fn set_panel(&self, entity_id: &str, reading: PanelReading) {
        self.inner.lock().panels.insert(entity_id.to_owned(), reading);
    }

    pub fn remove_panel(&self, entity_id: &str) {
        self.inner.lock().panels.remove(entity_id);
    }

    pub fn panel_state(&self, entity_id: &str) -> Option<String> {
        self.inner
            .lock()
            .panels
            .get(entity_id)
            .map(|reading| reading.state.clone())
    }

    pub fn set_presence(&self, occupant: &str, presence: Presence) {
        self.inner
            .lock()
            .presence
            .insert(occupant.to_owned(), presence);
    }

    pub fn set_sun(&self, sun: SunPosition) {
        self.inner.lock().sun = Some(sun);
    }

    /// Make a calendar exist, even without events.
    pub fn add_calendar(&self, calendar_id: &str) {
        self.inner
            .lock()
            .calendars
            .entry(calendar_id.to_owned())
            .or_default();
    }

    pub fn add_calendar_event(&self, calendar_id: &str, event: CalendarEvent) {
        self.inner
            .lock()
            .calendars
            .entry(calendar_id.to_owned())
            .or_default()
            .push(event);
    }

    /// Remove every event with this uid.
    pub fn remove_calendar_event(&self, calendar_id: &str, uid: &str) {
        if let Some(events) = self.inner.lock().calendars.get_mut(calendar_id) {
            events.retain(|event| event.uid.as_deref() != Some(uid));
        }
    }

    /// Replace the event with the same uid.
    pub fn update_calendar_event(&self, calendar_id: &str, event: CalendarEvent) {
        let mut inner = self.inner.lock();
        let events = inner.calendars.entry(calendar_id.to_owned()).or_default();
        events.retain(|existing| existing.uid.is_none() || existing.uid != event.uid);
        events.push(event);
    }

    pub fn set_calendar_offline(&self, calendar_id: &str, offline: bool) {
        let mut inner = self.inner.lock();
        if offline {
            inner.offline_calendars.insert(calendar_id.to_owned());
        } else {
            inner.offline_calendars.remove(calendar_id);
        }
    }

    pub fn fail_panel_writes(&self, fail: bool) {
        self.inner.lock().fail_panel_writes = fail;
    }

    /// Successful panel writes as (entity, state, changed_by).
    pub fn panel_writes(&self) -> Vec<(String, ArmState, String)> {
        self.inner.lock().panel_writes.clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().notifications.clone()
    }

    pub fn issues(&self) -> Vec<ConfigIssue> {
        self.inner.lock().issues.clone()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.lock().diagnostics.clone()
    }

    pub fn last_calculation(&self) -> Option<CalculationRecord> {
        self.inner
            .lock()
            .diagnostics
            .iter()
            .rev()
            .find_map(|diagnostic| match diagnostic {
                Diagnostic::LastCalculation(record) => Some(record.clone()),
                _ => None,
            })
    }
}

impl WorldStateReader for MemoryHome {
    fn panel(&self, entity_id: &str) -> Option<PanelReading> {
        self.inner.lock().panels.get(entity_id).cloned()
    }

    fn presence(&self, occupant: &str) -> Option<Presence> {
        self.inner.lock().presence.get(occupant).copied()
    }

    fn sun(&self) -> Option<SunPosition> {
        self.inner.lock().sun
    }
}

#[async_trait::async_trait]
impl PanelWriter for MemoryHome {
    async fn set_panel_state(
        &self,
        entity_id: &str,
        state: ArmState,
        changed_by: &str,
    ) -> Result<(), HostError> {
        let mut inner = self.inner.lock();
        if inner.fail_panel_writes {
            return Err(HostError::Service(format!("{entity_id} refused {state}")));
        }
        let reading = inner
            .panels
            .get_mut(entity_id)
            .ok_or_else(|| HostError::NotFound(entity_id.to_owned()))?;
        reading.state = state.as_str().to_owned();
        reading.changed_by = Some(changed_by.to_owned());
        inner
            .panel_writes
            .push((entity_id.to_owned(), state, changed_by.to_owned()));
        debug!(entity_id, %state, changed_by, "panel state set");
        Ok(())
    }
}

#[async_trait::async_trait]
impl CalendarSource for MemoryHome {
    async fn events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, HostError> {
        let inner = self.inner.lock();
        if inner.offline_calendars.contains(calendar_id) {
            return Err(HostError::CalendarUnavailable(calendar_id.to_owned()));
        }
        let events = inner
            .calendars
            .get(calendar_id)
            .ok_or_else(|| HostError::CalendarUnavailable(calendar_id.to_owned()))?;
        let mut overlapping: Vec<CalendarEvent> = events
            .iter()
            .filter(|event| event.start < end && event.end > start)
            .cloned()
            .collect();
        overlapping.sort_by_key(|event| event.start);
        Ok(overlapping)
    }
}

#[async_trait::async_trait]
impl NotificationSink for MemoryHome {
    async fn send(&self, notification: &Notification) -> Result<(), HostError> {
        info!(
            service = %notification.service,
            title = %notification.title,
            message = %notification.message,
            "notification"
        );
        self.inner.lock().notifications.push(notification.clone());
        Ok(())
    }
}

impl IssueReporter for MemoryHome {
    fn raise(&self, issue: ConfigIssue) {
        self.inner.lock().issues.push(issue);
    }
}

impl DiagnosticsSink for MemoryHome {
    fn publish(&self, diagnostic: Diagnostic) {
        self.inner.lock().diagnostics.push(diagnostic);
    }
}
