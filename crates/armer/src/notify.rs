#![forbid(unsafe_code)]

use crate::domain::{ArmState, ChangeSource};
use config::{NOTIFY_COMMON, NotifyProfile, NotifyProfiles};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// A message ready for the host's notification transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    /// Service name without the `notify.` domain.
    pub service: String,
    pub title: String,
    pub message: String,
    pub data: Map<String, Value>,
}

#[derive(Debug, Clone, Default)]
pub struct Notifier {
    profiles: NotifyProfiles,
}

impl Notifier {
    pub fn new(profiles: NotifyProfiles) -> Self {
        Self { profiles }
    }

    /// The most specific profile accepting this change. Profiles filtering
    /// on fewer states are tried first, then those filtering on source.
    pub fn select(
        &self,
        source: ChangeSource,
        from: Option<ArmState>,
        to: Option<ArmState>,
    ) -> Option<(&str, &NotifyProfile)> {
        let mut candidates: Vec<(&String, &NotifyProfile)> = self
            .profiles
            .iter()
            .filter(|(name, _)| name.as_str() != NOTIFY_COMMON)
            .collect();
        candidates.sort_by_key(|(_, profile)| {
            let states = if profile.state.is_empty() {
                ArmState::ALL.len()
            } else {
                profile.state.len()
            };
            (states, profile.source.is_empty())
        });

        candidates
            .into_iter()
            .find(|(name, profile)| {
                if !profile.source.is_empty() && !profile.source.contains(&source) {
                    debug!(profile = %name, %source, "profile skipped on source");
                    return false;
                }
                let wanted = |state: Option<ArmState>| {
                    state.is_some_and(|state| profile.state.contains(&state))
                };
                if !profile.state.is_empty() && !wanted(from) && !wanted(to) {
                    debug!(profile = %name, ?from, ?to, "profile skipped on state");
                    return false;
                }
                true
            })
            .map(|(name, profile)| (name.as_str(), profile))
    }

    /// Build the notification for a change, or `None` when no service is
    /// configured.
    pub fn compose(
        &self,
        source: ChangeSource,
        from: Option<ArmState>,
        to: Option<ArmState>,
        message: Option<String>,
        title: Option<String>,
    ) -> Option<Notification> {
        let selected = self.select(source, from, to);
        if selected.is_none() {
            debug!(%source, ?message, "no notification profile selected");
        }

        let common = self.profiles.get(NOTIFY_COMMON);
        let layers = [common, selected.map(|(_, profile)| profile)];

        let mut data = Map::new();
        let mut service = None;
        let mut supernotify = false;
        let mut scenario: &[String] = &[];
        for profile in layers.into_iter().flatten() {
            data.extend(profile.data.clone());
            if let Some(name) = &profile.service {
                service = Some(name.as_str());
            }
            if let Some(flag) = profile.supernotify {
                supernotify = flag;
            }
            if !profile.scenario.is_empty() {
                scenario = &profile.scenario;
            }
        }

        fill_placeholder(&mut data, "source", || Value::from(source.as_str()));
        fill_placeholder(&mut data, "profile", || {
            selected.map_or(Value::Null, |(name, _)| Value::from(name))
        });
        if supernotify && !scenario.is_empty() {
            data.insert("apply_scenarios".into(), Value::from(scenario.to_vec()));
        }

        let service = service
            .map(|name| name.strip_prefix("notify.").unwrap_or(name))
            .filter(|name| !name.is_empty());
        let Some(service) = service else {
            debug!(%source, "notification skipped, no service");
            return None;
        };

        let title = title.unwrap_or_else(|| match to {
            Some(to) => format!("Alarm now {to}"),
            None => "Alarm Panel Change".to_owned(),
        });
        let message = message.unwrap_or_else(|| match (from, to) {
            (Some(from), Some(to)) => format!(
                "Alarm state changed from {from} to {to} by {}",
                capitalize(source.as_str())
            ),
            _ => "Alarm control panel operation complete".to_owned(),
        });

        Some(Notification {
            service: service.to_owned(),
            title,
            message,
            data,
        })
    }
}

/// Replace a key that is present but left empty.
fn fill_placeholder(data: &mut Map<String, Value>, key: &str, value: impl FnOnce() -> Value) {
    if let Some(slot) = data.get_mut(key) {
        let empty = match slot {
            Value::Null => true,
            Value::String(text) => text.is_empty(),
            _ => false,
        };
        if empty {
            *slot = value();
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{NOTIFY_NORMAL, NOTIFY_QUIET, apply_notify_defaults};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn profile(source: &[ChangeSource], state: &[ArmState]) -> NotifyProfile {
        NotifyProfile {
            source: source.to_vec(),
            state: state.to_vec(),
            ..Default::default()
        }
    }

    #[test]
    fn default_profiles_split_quiet_and_normal() {
        let mut profiles = NotifyProfiles::new();
        apply_notify_defaults(&mut profiles);
        let notifier = Notifier::new(profiles);

        let (name, _) = notifier
            .select(ChangeSource::Sunset, Some(ArmState::ArmedHome), Some(ArmState::ArmedNight))
            .unwrap();
        assert_eq!(name, NOTIFY_QUIET);

        let (name, _) = notifier
            .select(ChangeSource::Occupancy, Some(ArmState::ArmedHome), Some(ArmState::ArmedAway))
            .unwrap();
        assert_eq!(name, NOTIFY_NORMAL);

        let note = notifier
            .compose(
                ChangeSource::AlarmPanel,
                Some(ArmState::Disarmed),
                Some(ArmState::ArmedAway),
                None,
                None,
            )
            .unwrap();
        assert_eq!(note.service, "send_message");
        assert_eq!(note.title, "Alarm now armed_away");
        assert_eq!(
            note.message,
            "Alarm state changed from disarmed to armed_away by Alarm_panel"
        );
    }

    #[test]
    fn state_specific_profiles_win() {
        let mut profiles = NotifyProfiles::new();
        profiles.insert("any".into(), profile(&[], &[]));
        profiles.insert(
            "vacation".into(),
            NotifyProfile {
                service: Some("notify.family".into()),
                data: Map::from_iter([("priority".to_owned(), json!("high"))]),
                ..profile(&[], &[ArmState::ArmedVacation])
            },
        );
        profiles.insert("button".into(), profile(&[ChangeSource::Button], &[ArmState::ArmedVacation]));
        apply_notify_defaults(&mut profiles);
        let notifier = Notifier::new(profiles);

        let note = notifier
            .compose(
                ChangeSource::Calendar,
                Some(ArmState::ArmedVacation),
                Some(ArmState::ArmedHome),
                Some("Back home".into()),
                None,
            )
            .unwrap();
        assert_eq!(note.service, "family");
        assert_eq!(note.message, "Back home");
        assert_eq!(note.data["priority"], "high");

        let (name, _) = notifier
            .select(ChangeSource::Calendar, Some(ArmState::Disarmed), Some(ArmState::ArmedHome))
            .unwrap();
        assert_eq!(name, "any");
    }

    #[test]
    fn fills_placeholders_and_scenarios() {
        let mut profiles = NotifyProfiles::new();
        profiles.insert(
            NOTIFY_COMMON.into(),
            NotifyProfile {
                service: Some("notify.supernotify".into()),
                data: Map::from_iter([
                    ("source".to_owned(), Value::Null),
                    ("profile".to_owned(), json!("")),
                    ("keep".to_owned(), json!("me")),
                ]),
                ..Default::default()
            },
        );
        profiles.insert(
            "alerts".into(),
            NotifyProfile {
                scenario: vec!["red_alert".into()],
                ..Default::default()
            },
        );
        apply_notify_defaults(&mut profiles);
        let notifier = Notifier::new(profiles);

        let note = notifier
            .compose(ChangeSource::Button, None, Some(ArmState::ArmedAway), None, None)
            .unwrap();
        assert_eq!(note.service, "supernotify");
        assert_eq!(note.message, "Alarm control panel operation complete");
        assert_eq!(
            Value::Object(note.data),
            json!({
                "source": "button",
                "profile": "alerts",
                "keep": "me",
                "apply_scenarios": ["red_alert"],
            })
        );
    }

    #[test]
    fn no_service_means_no_notification() {
        let mut profiles = NotifyProfiles::new();
        profiles.insert(
            NOTIFY_COMMON.into(),
            NotifyProfile {
                service: Some(String::new()),
                ..Default::default()
            },
        );
        let notifier = Notifier::new(profiles);
        assert!(notifier
            .compose(ChangeSource::Sunset, None, None, None, None)
            .is_none());
    }
}
