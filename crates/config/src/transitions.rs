#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use serde_with::{OneOrMany, serde_as};

/// A user supplied rule: move to `state` when every condition holds.
///
/// `state` stays a plain string so that a misspelt state is reported as a
/// configuration issue instead of failing the whole load.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transition {
    pub state: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,

    /// Condition expressions, all of which must be true.
    #[serde(default)]
    #[serde_as(as = "OneOrMany<_>")]
    pub conditions: Vec<String>,
}

impl Transition {
    pub fn new(state: impl Into<String>, conditions: &[&str]) -> Self {
        Self {
            state: state.into(),
            alias: None,
            conditions: conditions.iter().map(|c| (*c).to_owned()).collect(),
        }
    }
}

/// Rules applied for every target state the configuration leaves out, in
/// evaluation order.
pub fn default_transitions() -> Vec<Transition> {
    vec![
        Transition::new(
            "armed_home",
            &[
                "occupied and daytime",
                "computed and occupied_daytime_state == 'armed_home'",
            ],
        ),
        Transition::new("armed_away", &["not occupied and computed"]),
        Transition::new(
            "disarmed",
            &[
                "occupied and daytime",
                "computed and occupied_daytime_state == 'disarmed'",
            ],
        ),
        Transition::new("armed_night", &["occupied and night and computed"]),
        Transition::new("armed_vacation", &["vacation"]),
    ]
}
