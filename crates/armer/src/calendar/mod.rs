#![forbid(unsafe_code)]

mod matcher;
mod tracked;
mod tracker;

pub use matcher::{PatternError, StateMatcher};
pub use tracked::{TrackStatus, TrackedCalendarEvent};
pub use tracker::{PollAction, TrackedCalendar};
