#![forbid(unsafe_code)]

use crate::states::ArmState;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, OneOrMany, serde_as};
use std::fmt;
use std::time::Duration;

/// What pressing a configured button asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(try_from = "String", into = "String")]
pub enum ButtonAction {
    /// Throw away manual choices and recompute.
    Reset,
    /// Go to a specific state.
    Arm(ArmState),
}

impl TryFrom<String> for ButtonAction {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.eq_ignore_ascii_case("reset") {
            return Ok(Self::Reset);
        }
        value
            .parse::<ArmState>()
            .map(Self::Arm)
            .map_err(|err| err.to_string())
    }
}

impl From<ButtonAction> for String {
    fn from(value: ButtonAction) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ButtonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reset => f.write_str("reset"),
            Self::Arm(state) => write!(f, "{state}"),
        }
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Button {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Wait this many seconds before acting on the press.
    #[serde(default)]
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub delay: Option<Duration>,

    /// Entities whose state change counts as a press.
    #[serde_as(as = "OneOrMany<_>")]
    pub entity_id: Vec<String>,
}
