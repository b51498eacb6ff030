#![forbid(unsafe_code)]

use crate::buttons::{Button, ButtonAction};
use crate::calendar::CalendarControl;
use crate::error::Error;
use crate::notify::{NotifyProfiles, apply_notify_defaults};
use crate::occupancy::Occupancy;
use crate::rate_limit::{Housekeeping, RateLimit};
use crate::transitions::Transition;
use chrono::NaiveTime;
use chrono_tz::Tz;
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, serde_as};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct AlarmPanel {
    /// Entity id of the alarm control panel being driven.
    pub entity_id: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Sunrise {
    /// Never act on sunrise before this local time.
    pub earliest: Option<NaiveTime>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct Diurnal {
    pub sunrise: Sunrise,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub alarm_panel: AlarmPanel,

    /// Zone used for local wall-clock rules such as the sunrise cutoff.
    #[serde_as(as = "DisplayFromStr")]
    pub timezone: Tz,

    pub diurnal: Diurnal,

    /// Transition rules in evaluation order. States left out fall back to
    /// the built-in rules.
    pub transitions: Vec<Transition>,

    pub calendar_control: CalendarControl,

    pub buttons: BTreeMap<ButtonAction, Button>,

    pub occupancy: Occupancy,

    pub notify: NotifyProfiles,

    pub rate_limit: RateLimit,

    pub housekeeping: Housekeeping,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alarm_panel: AlarmPanel::default(),
            timezone: Tz::UTC,
            diurnal: Diurnal::default(),
            transitions: Vec::new(),
            calendar_control: CalendarControl::default(),
            buttons: BTreeMap::new(),
            occupancy: Occupancy::default(),
            notify: NotifyProfiles::new(),
            rate_limit: RateLimit::default(),
            housekeeping: Housekeeping::default(),
        }
    }
}

impl Config {
    /// Default configuration with the built-in notification profiles.
    pub fn new() -> Self {
        let mut config = Self::default();
        apply_notify_defaults(&mut config.notify);
        config
    }

    /// Load a TOML file layered over the defaults, then `AUTOARM_`
    /// environment overrides (`AUTOARM_RATE_LIMIT__MAX_CALLS=3`).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::InvalidPath(path.to_owned()));
        }
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::file(path)))
    }

    /// Parse configuration from a TOML string layered over the defaults.
    pub fn from_toml(toml: &str) -> Result<Self, Error> {
        Self::extract(Figment::from(Serialized::defaults(Self::default())).merge(Toml::string(toml)))
    }

    fn extract(figment: Figment) -> Result<Self, Error> {
        let mut config: Config = figment
            .merge(Env::prefixed("AUTOARM_").split("__"))
            .extract()?;
        apply_notify_defaults(&mut config.notify);
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the engine cannot run with at all. Softer
    /// problems, like a broken transition, are reported by the engine.
    pub fn validate(&self) -> Result<(), Error> {
        if self.alarm_panel.entity_id.trim().is_empty() {
            return Err(Error::Invalid("alarm_panel.entity_id is required".into()));
        }
        for calendar in &self.calendar_control.calendars {
            if calendar.entity_id.trim().is_empty() {
                return Err(Error::Invalid("calendar entity_id is required".into()));
            }
        }
        for (action, button) in &self.buttons {
            if button.entity_id.is_empty() {
                return Err(Error::Invalid(format!("button `{action}` has no entity_id")));
            }
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> Result<String, Error> {
        Ok(toml_edit::ser::to_string_pretty(self)?)
    }
}
