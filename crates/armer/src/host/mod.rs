#![forbid(unsafe_code)]

//! Everything the engine needs from the home it runs in.

mod memory;

use crate::diagnostics::Diagnostic;
use crate::domain::{ArmState, CalendarEvent, PanelReading, Presence, SunPosition};
use crate::notify::Notification;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub use memory::MemoryHome;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("entity `{0}` not found")]
    NotFound(String),

    #[error("calendar `{0}` is unavailable")]
    CalendarUnavailable(String),

    #[error("service call failed: {0}")]
    Service(String),
}

/// Read-only view of the world.
pub trait WorldStateReader: Send + Sync {
    /// `None` when the panel entity does not exist.
    fn panel(&self, entity_id: &str) -> Option<PanelReading>;

    /// `None` when the occupant is unknown.
    fn presence(&self, occupant: &str) -> Option<Presence>;

    fn sun(&self) -> Option<SunPosition>;
}

#[async_trait::async_trait]
pub trait PanelWriter: Send + Sync {
    /// Set the panel state, tagging the change with `changed_by`.
    async fn set_panel_state(
        &self,
        entity_id: &str,
        state: ArmState,
        changed_by: &str,
    ) -> Result<(), HostError>;
}

#[async_trait::async_trait]
pub trait CalendarSource: Send + Sync {
    /// Events overlapping `[start, end)`.
    async fn events(
        &self,
        calendar_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<CalendarEvent>, HostError>;
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), HostError>;
}

/// A configuration problem an operator should fix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    /// Stable key, such as `transition_condition`.
    pub key: String,
    /// What the problem is attached to, e.g. a state or calendar.
    pub subject: String,
    pub error: String,
}

impl ConfigIssue {
    pub fn new(key: &str, subject: impl Into<String>, error: impl ToString) -> Self {
        Self {
            key: key.to_owned(),
            subject: subject.into(),
            error: error.to_string(),
        }
    }
}

pub trait IssueReporter: Send + Sync {
    fn raise(&self, issue: ConfigIssue);
}

pub trait DiagnosticsSink: Send + Sync {
    fn publish(&self, diagnostic: Diagnostic);
}
