#![forbid(unsafe_code)]

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::hash::{DefaultHasher, Hash, Hasher};

/// An event as returned by a calendar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarEvent {
    #[serde(default)]
    pub uid: Option<String>,
    pub summary: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CalendarEvent {
    pub fn new(summary: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            uid: None,
            summary: summary.into(),
            description: None,
            start,
            end,
        }
    }

    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.uid = Some(uid.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Identifier unique within the owning calendar. Calendars that do not
    /// hand out uids get a hash of the event contents instead.
    pub fn tracking_id(&self, calendar_id: &str) -> String {
        match &self.uid {
            Some(uid) => format!("{calendar_id}:{uid}"),
            None => {
                let mut hasher = DefaultHasher::new();
                (&self.summary, &self.description, self.start, self.end).hash(&mut hasher);
                format!("{calendar_id}:{:x}", hasher.finish())
            }
        }
    }

    /// Both ends are inclusive.
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }
}
