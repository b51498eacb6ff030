#![forbid(unsafe_code)]

use crate::domain::{ArmState, ChangeSource};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Every `changed_by` attribute written by the engine starts with this.
pub const PROVENANCE_PREFIX: &str = "autoarm.";

/// Provenance tag written alongside a panel change.
pub fn changed_by(source: Option<ChangeSource>) -> String {
    format!(
        "{PROVENANCE_PREFIX}{}",
        source.map_or("auto", ChangeSource::as_str)
    )
}

/// Raw panel state as the host reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelReading {
    pub state: String,
    #[serde(default)]
    pub changed_by: Option<String>,
}

impl PanelReading {
    pub fn new(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
            changed_by: None,
        }
    }

    /// Written by this engine rather than by a person or another automation.
    pub fn is_self_caused(&self) -> bool {
        is_own_change(self.changed_by.as_deref())
    }
}

/// Whether a `changed_by` attribute carries the engine's own tag.
pub fn is_own_change(changed_by: Option<&str>) -> bool {
    changed_by.is_some_and(|by| by.starts_with(PROVENANCE_PREFIX))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SunPosition {
    AboveHorizon,
    BelowHorizon,
}

/// Parse a raw state, warning about anything unrecognised.
pub fn parse_state(raw: Option<&str>) -> Option<ArmState> {
    let raw = raw?;
    match raw.parse::<ArmState>() {
        Ok(state) => Some(state),
        Err(err) => {
            warn!(%err, "invalid alarm state");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_own_writes() {
        let mut reading = PanelReading::new("armed_away");
        assert!(!reading.is_self_caused());

        reading.changed_by = Some(changed_by(Some(ChangeSource::Sunset)));
        assert_eq!(reading.changed_by.as_deref(), Some("autoarm.sunset"));
        assert!(reading.is_self_caused());

        reading.changed_by = Some("keypad".into());
        assert!(!reading.is_self_caused());
        assert!(!is_own_change(None));
        assert!(!is_own_change(Some("autoarm")));
    }
}
