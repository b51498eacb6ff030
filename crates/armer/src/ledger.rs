#![forbid(unsafe_code)]

use crate::domain::{ArmState, ChangeSource, Intervention};
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Time bounded log of interventions, oldest first.
#[derive(Debug, Default, Clone)]
pub struct InterventionLedger {
    entries: Vec<Intervention>,
}

impl InterventionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &mut self,
        source: ChangeSource,
        state: Option<ArmState>,
        now: DateTime<Utc>,
    ) -> Intervention {
        let intervention = Intervention::new(now, source, state);
        debug!(%source, state = ?state, "intervention recorded");
        self.entries.push(intervention.clone());
        intervention
    }

    /// Whether anything was recorded strictly after `cutoff`.
    pub fn has_intervention_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.entries.iter().any(|entry| entry.created_at > cutoff)
    }

    /// Most recent intervention that chose an explicit state.
    pub fn last_state_intervention(&self) -> Option<&Intervention> {
        self.entries.iter().rev().find(|entry| entry.state.is_some())
    }

    /// Drop everything older than `ttl`. Returns how many were dropped.
    pub fn prune(&mut self, now: DateTime<Utc>, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|entry| now < entry.created_at + ttl);
        let pruned = before - self.entries.len();
        if pruned > 0 {
            debug!(pruned, remaining = self.entries.len(), "pruned interventions");
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Intervention] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn tracks_latest_state_choice() {
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let mut ledger = InterventionLedger::new();
        assert!(ledger.last_state_intervention().is_none());

        ledger.record(ChangeSource::Button, Some(ArmState::ArmedAway), t0);
        ledger.record(ChangeSource::Button, None, t0 + Duration::from_secs(5));

        let last = ledger.last_state_intervention().unwrap();
        assert_eq!(last.state, Some(ArmState::ArmedAway));
        assert!(ledger.has_intervention_since(t0));
        assert!(!ledger.has_intervention_since(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn prune_drops_expired_entries() {
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let ttl = Duration::from_secs(3600);
        let mut ledger = InterventionLedger::new();
        ledger.record(ChangeSource::AlarmPanel, Some(ArmState::Disarmed), t0);
        ledger.record(ChangeSource::Mobile, Some(ArmState::ArmedAway), t0 + Duration::from_secs(1800));

        assert_eq!(ledger.prune(t0 + Duration::from_secs(3599), ttl), 0);
        assert_eq!(ledger.prune(t0 + ttl, ttl), 1);
        assert_eq!(ledger.entries()[0].source, ChangeSource::Mobile);
        assert_eq!(ledger.prune(t0 + ttl * 2, ttl), 1);
        assert!(ledger.is_empty());
    }
}
