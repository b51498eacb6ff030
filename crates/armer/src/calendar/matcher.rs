#![forbid(unsafe_code)]

use crate::domain::ArmState;
use regex::Regex;
use std::collections::BTreeMap;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PatternError {
    #[error("pattern `{pattern}` for {state} is not a valid regex: {source}")]
    Regex {
        state: ArmState,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("calendar events can not arm {0}")]
    NotStable(ArmState),
}

/// Picks the alarm state a calendar event asks for.
#[derive(Debug, Clone, Default)]
pub struct StateMatcher {
    patterns: Vec<(ArmState, Vec<Regex>)>,
}

impl StateMatcher {
    /// Compile every pattern that can be compiled, returning the rest as
    /// errors.
    pub fn compile(patterns: &BTreeMap<ArmState, Vec<String>>) -> (Self, Vec<PatternError>) {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut errors = Vec::new();

        for (state, sources) in patterns {
            if !state.is_stable() {
                errors.push(PatternError::NotStable(*state));
                continue;
            }
            let mut regexes = Vec::with_capacity(sources.len());
            for pattern in sources {
                match Regex::new(pattern) {
                    Ok(regex) => regexes.push(regex),
                    Err(source) => errors.push(PatternError::Regex {
                        state: *state,
                        pattern: pattern.clone(),
                        source,
                    }),
                }
            }
            if !regexes.is_empty() {
                compiled.push((*state, regexes));
            }
        }

        (Self { patterns: compiled }, errors)
    }

    /// An upper case state name such as `ARMED_AWAY` anywhere in the
    /// summary or description wins, otherwise the first state with a
    /// matching pattern.
    pub fn match_event(&self, summary: &str, description: Option<&str>) -> Option<ArmState> {
        let texts = [Some(summary), description];

        let keyword = ArmState::ALL
            .into_iter()
            .filter(|state| state.is_stable())
            .find(|state| {
                let word = state.as_str().to_ascii_uppercase();
                texts.iter().flatten().any(|text| text.contains(&word))
            });
        if keyword.is_some() {
            return keyword;
        }

        self.patterns.iter().find_map(|(state, regexes)| {
            regexes
                .iter()
                .any(|regex| texts.iter().flatten().any(|text| regex.is_match(text)))
                .then_some(*state)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::default_state_patterns;

    #[test]
    fn keywords_beat_patterns() {
        let (matcher, errors) = StateMatcher::compile(&default_state_patterns());
        assert!(errors.is_empty());

        assert_eq!(
            matcher.match_event("Holiday but ARMED_HOME", None),
            Some(ArmState::ArmedHome)
        );
        assert_eq!(
            matcher.match_event("Dentist", Some("house sitter, DISARMED")),
            Some(ArmState::Disarmed)
        );
        assert_eq!(
            matcher.match_event("Summer Holiday", None),
            Some(ArmState::ArmedVacation)
        );
        assert_eq!(
            matcher.match_event("Trip", Some("Away for the weekend")),
            Some(ArmState::ArmedAway)
        );
        assert_eq!(matcher.match_event("Dentist", None), None);
        // Patterns are case sensitive.
        assert_eq!(matcher.match_event("away day", None), None);
    }

    #[test]
    fn bad_patterns_are_skipped() {
        let patterns = BTreeMap::from([
            (ArmState::ArmedAway, vec!["(unclosed".to_owned(), "Out".to_owned()]),
            (ArmState::Pending, vec!["Wait".to_owned()]),
        ]);
        let (matcher, errors) = StateMatcher::compile(&patterns);

        assert_eq!(errors.len(), 2);
        assert!(matches!(errors[0], PatternError::Regex { state: ArmState::ArmedAway, .. }));
        assert!(matches!(errors[1], PatternError::NotStable(ArmState::Pending)));
        assert_eq!(matcher.match_event("Out all day", None), Some(ArmState::ArmedAway));
        assert_eq!(matcher.match_event("Wait", None), None);
    }
}
