#![forbid(unsafe_code)]

use crate::domain::ArmState;
use crate::rules::expr::{Expr, ExprError};
use crate::snapshot::Snapshot;
use config::{Transition, default_transitions};
use std::collections::BTreeSet;
use tracing::debug;

/// Why a configured transition was dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("`{0}` is not an alarm state")]
    UnknownState(String),

    #[error("{0} can not be the target of a transition")]
    NotStable(ArmState),

    #[error("transition has no conditions")]
    NoConditions,

    #[error("{0} already has a transition, only the first is used")]
    Duplicate(ArmState),

    #[error("condition `{condition}`: {source}")]
    Condition {
        condition: String,
        #[source]
        source: ExprError,
    },
}

/// A rejected transition, keyed by the state it was configured for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIssue {
    pub state: String,
    pub error: RuleError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRule {
    pub target: ArmState,
    pub alias: Option<String>,
    /// Every one of these must hold.
    pub conditions: Vec<Expr>,
}

impl TransitionRule {
    pub fn compile(transition: &Transition) -> Result<Self, RuleError> {
        let target = transition
            .state
            .parse::<ArmState>()
            .map_err(|_| RuleError::UnknownState(transition.state.clone()))?;
        if !target.is_stable() {
            return Err(RuleError::NotStable(target));
        }
        if transition.conditions.is_empty() {
            return Err(RuleError::NoConditions);
        }
        let conditions = transition
            .conditions
            .iter()
            .map(|condition| {
                Expr::parse(condition).map_err(|source| RuleError::Condition {
                    condition: condition.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            target,
            alias: transition.alias.clone(),
            conditions,
        })
    }

    pub fn matches(&self, snapshot: &Snapshot) -> Result<bool, ExprError> {
        for condition in &self.conditions {
            if !condition.eval(snapshot)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Ordered transition rules. The first matching rule decides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<TransitionRule>,
}

impl RuleSet {
    /// Compile configured transitions, then append the built-in rule of
    /// every state the configuration does not mention. A configured rule
    /// that fails to compile still replaces its built-in one.
    pub fn build(configured: &[Transition]) -> (Self, Vec<RuleIssue>) {
        let mut rules = Vec::new();
        let mut issues = Vec::new();
        let mut claimed = BTreeSet::new();

        for transition in configured {
            let state = transition.state.parse::<ArmState>().ok();
            if let Some(state) = state {
                if !claimed.insert(state) {
                    issues.push(RuleIssue {
                        state: transition.state.clone(),
                        error: RuleError::Duplicate(state),
                    });
                    continue;
                }
            }
            match TransitionRule::compile(transition) {
                Ok(rule) => rules.push(rule),
                Err(error) => issues.push(RuleIssue {
                    state: transition.state.clone(),
                    error,
                }),
            }
        }

        for transition in default_transitions() {
            let Ok(state) = transition.state.parse::<ArmState>() else {
                continue;
            };
            if claimed.contains(&state) {
                continue;
            }
            match TransitionRule::compile(&transition) {
                Ok(rule) => rules.push(rule),
                Err(error) => issues.push(RuleIssue {
                    state: transition.state.clone(),
                    error,
                }),
            }
        }

        (Self { rules }, issues)
    }

    pub fn rules(&self) -> &[TransitionRule] {
        &self.rules
    }

    /// First target whose conditions all hold, if any.
    pub fn determine(&self, snapshot: &Snapshot) -> Result<Option<ArmState>, ExprError> {
        for rule in &self.rules {
            if rule.matches(snapshot)? {
                debug!(state = %rule.target, alias = ?rule.alias, "transition matched");
                return Ok(Some(rule.target));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CalendarEvent, DayPart};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, BTreeSet};

    fn snapshot(occupied: bool, night: bool, state: ArmState) -> Snapshot {
        Snapshot {
            occupied,
            night,
            current_state: state,
            active_calendar_event: None,
            occupied_defaults: BTreeMap::from([(DayPart::Day, ArmState::ArmedHome)]),
            at_home: BTreeSet::new(),
            not_home: BTreeSet::new(),
        }
    }

    fn targets(rules: &RuleSet) -> Vec<ArmState> {
        rules.rules().iter().map(|rule| rule.target).collect()
    }

    #[test]
    fn defaults_cover_the_usual_day() {
        let (rules, issues) = RuleSet::build(&[]);
        assert!(issues.is_empty());
        assert_eq!(
            targets(&rules),
            vec![
                ArmState::ArmedHome,
                ArmState::ArmedAway,
                ArmState::Disarmed,
                ArmState::ArmedNight,
                ArmState::ArmedVacation
            ]
        );

        let decide = |snap: Snapshot| rules.determine(&snap).unwrap();
        assert_eq!(decide(snapshot(true, false, ArmState::Disarmed)), Some(ArmState::ArmedHome));
        assert_eq!(decide(snapshot(false, false, ArmState::ArmedHome)), Some(ArmState::ArmedAway));
        assert_eq!(decide(snapshot(true, true, ArmState::ArmedHome)), Some(ArmState::ArmedNight));
        assert_eq!(
            decide(snapshot(false, true, ArmState::ArmedVacation)),
            Some(ArmState::ArmedVacation)
        );
    }

    #[test]
    fn occupied_daytime_default_selects_disarmed() {
        let (rules, _) = RuleSet::build(&[]);
        let mut snap = snapshot(true, false, ArmState::ArmedNight);
        snap.occupied_defaults.insert(DayPart::Day, ArmState::Disarmed);
        assert_eq!(rules.determine(&snap).unwrap(), Some(ArmState::Disarmed));
    }

    #[test]
    fn calendar_event_blocks_computed_states() {
        let (rules, _) = RuleSet::build(&[]);
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mut snap = snapshot(false, false, ArmState::ArmedHome);
        snap.active_calendar_event = Some(CalendarEvent::new("Away", at, at));
        assert_eq!(rules.determine(&snap).unwrap(), None);
    }

    #[test]
    fn configured_rules_come_first_and_replace_defaults() {
        let (rules, issues) = RuleSet::build(&[
            Transition::new("armed_away", &["not occupied"]),
            Transition::new("armed_home", &["occupied"]),
        ]);
        assert!(issues.is_empty());
        assert_eq!(
            targets(&rules),
            vec![
                ArmState::ArmedAway,
                ArmState::ArmedHome,
                ArmState::Disarmed,
                ArmState::ArmedNight,
                ArmState::ArmedVacation
            ]
        );
        // Vacation is no longer protected once the away rule skips `computed`.
        assert_eq!(
            rules
                .determine(&snapshot(false, false, ArmState::ArmedVacation))
                .unwrap(),
            Some(ArmState::ArmedAway)
        );
    }

    #[test]
    fn broken_rules_are_reported_and_dropped() {
        let (rules, issues) = RuleSet::build(&[
            Transition::new("armed_night", &["occupied and"]),
            Transition::new("armed_sideways", &["occupied"]),
            Transition::new("pending", &["occupied"]),
            Transition::new("disarmed", &[]),
            Transition::new("armed_home", &["occupied"]),
            Transition::new("armed_home", &["night"]),
        ]);

        let errors: Vec<_> = issues.iter().map(|issue| issue.error.clone()).collect();
        assert!(matches!(errors[0], RuleError::Condition { .. }));
        assert_eq!(errors[1], RuleError::UnknownState("armed_sideways".into()));
        assert_eq!(errors[2], RuleError::NotStable(ArmState::Pending));
        assert_eq!(errors[3], RuleError::NoConditions);
        assert_eq!(errors[4], RuleError::Duplicate(ArmState::ArmedHome));
        assert_eq!(issues.len(), 5);

        // armed_night and disarmed keep no rule at all.
        assert_eq!(
            targets(&rules),
            vec![ArmState::ArmedHome, ArmState::ArmedAway, ArmState::ArmedVacation]
        );
    }
}
