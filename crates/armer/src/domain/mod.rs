#![forbid(unsafe_code)]

mod calendar_event;
mod intervention;
mod panel;

pub use calendar_event::CalendarEvent;
pub use config::{ArmState, ChangeSource, DayPart, Presence};
pub use intervention::Intervention;
pub use panel::{
    PROVENANCE_PREFIX, PanelReading, SunPosition, changed_by, is_own_change, parse_state,
};
