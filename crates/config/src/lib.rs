#![forbid(unsafe_code)]

mod buttons;
mod calendar;
mod error;
mod model;
mod notify;
mod occupancy;
mod rate_limit;
mod states;
mod transitions;

pub use buttons::{Button, ButtonAction};
pub use calendar::{CalendarConfig, CalendarControl, NoEventMode, default_state_patterns};
pub use error::Error;
pub use model::{AlarmPanel, Config, Diurnal, Sunrise};
pub use notify::{
    DEFAULT_NOTIFY_SERVICE, NOTIFY_COMMON, NOTIFY_NORMAL, NOTIFY_QUIET, NotifyProfile,
    NotifyProfiles, apply_notify_defaults,
};
pub use occupancy::Occupancy;
pub use rate_limit::{Housekeeping, RateLimit};
pub use states::{ArmState, ChangeSource, DayPart, Presence, UnknownState};
pub use transitions::{Transition, default_transitions};
