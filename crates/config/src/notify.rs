#![forbid(unsafe_code)]

use crate::states::{ArmState, ChangeSource};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_with::{OneOrMany, serde_as};
use std::collections::BTreeMap;

/// Profile merged into every notification.
pub const NOTIFY_COMMON: &str = "common";
pub const NOTIFY_QUIET: &str = "quiet";
pub const NOTIFY_NORMAL: &str = "normal";

pub const DEFAULT_NOTIFY_SERVICE: &str = "notify.send_message";

/// A notification profile, selected by the source of the change and the
/// states involved.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct NotifyProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub supernotify: Option<bool>,

    /// Only use this profile for these sources. Empty means any source.
    #[serde_as(as = "OneOrMany<_>")]
    pub source: Vec<ChangeSource>,

    /// Only use this profile when leaving or entering these states. Empty
    /// means any state.
    #[serde_as(as = "OneOrMany<_>")]
    pub state: Vec<ArmState>,

    #[serde_as(as = "OneOrMany<_>")]
    pub scenario: Vec<String>,

    pub data: Map<String, Value>,
}

pub type NotifyProfiles = BTreeMap<String, NotifyProfile>;

/// Fill in the built-in profiles.
///
/// An empty configuration gets a `quiet` and a `normal` profile. A `quiet`
/// profile without sources takes the low-drama sources that no other
/// state-agnostic profile has claimed. The `common` profile always exists
/// and names a service.
pub fn apply_notify_defaults(profiles: &mut NotifyProfiles) {
    if profiles.is_empty() {
        profiles.insert(NOTIFY_QUIET.to_owned(), NotifyProfile::default());
        profiles.insert(NOTIFY_NORMAL.to_owned(), NotifyProfile::default());
    }

    let claimed: Vec<ChangeSource> = profiles
        .values()
        .filter(|profile| profile.state.is_empty())
        .flat_map(|profile| profile.source.iter().copied())
        .collect();

    if let Some(quiet) = profiles.get_mut(NOTIFY_QUIET)
        && quiet.source.is_empty()
    {
        quiet.source = [
            ChangeSource::AlarmPanel,
            ChangeSource::Button,
            ChangeSource::Calendar,
            ChangeSource::Sunrise,
            ChangeSource::Sunset,
        ]
        .into_iter()
        .filter(|source| !claimed.contains(source))
        .collect();
    }

    let common = profiles.entry(NOTIFY_COMMON.to_owned()).or_default();
    let service = common
        .service
        .get_or_insert_with(|| DEFAULT_NOTIFY_SERVICE.to_owned())
        .clone();
    if common.supernotify.is_none() {
        common.supernotify = Some(
            ["supernotify", "supernotifier"]
                .iter()
                .any(|suffix| service.ends_with(suffix)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_config_gets_quiet_normal_and_common() {
        let mut profiles = NotifyProfiles::new();
        apply_notify_defaults(&mut profiles);

        assert_eq!(
            profiles.keys().map(String::as_str).collect::<Vec<_>>(),
            vec![NOTIFY_COMMON, NOTIFY_NORMAL, NOTIFY_QUIET]
        );
        assert_eq!(
            profiles[NOTIFY_QUIET].source,
            vec![
                ChangeSource::AlarmPanel,
                ChangeSource::Button,
                ChangeSource::Calendar,
                ChangeSource::Sunrise,
                ChangeSource::Sunset,
            ]
        );
        assert_eq!(
            profiles[NOTIFY_COMMON].service.as_deref(),
            Some(DEFAULT_NOTIFY_SERVICE)
        );
        assert_eq!(profiles[NOTIFY_COMMON].supernotify, Some(false));
    }

    #[test]
    fn quiet_skips_sources_claimed_elsewhere() {
        let mut profiles = NotifyProfiles::new();
        profiles.insert(NOTIFY_QUIET.to_owned(), NotifyProfile::default());
        profiles.insert(
            "loud".to_owned(),
            NotifyProfile {
                source: vec![ChangeSource::Button],
                ..Default::default()
            },
        );
        profiles.insert(
            NOTIFY_COMMON.to_owned(),
            NotifyProfile {
                service: Some("notify.supernotifier".to_owned()),
                ..Default::default()
            },
        );
        apply_notify_defaults(&mut profiles);

        assert!(!profiles[NOTIFY_QUIET].source.contains(&ChangeSource::Button));
        assert!(profiles[NOTIFY_QUIET].source.contains(&ChangeSource::Sunset));
        assert_eq!(profiles[NOTIFY_COMMON].supernotify, Some(true));
    }
}
