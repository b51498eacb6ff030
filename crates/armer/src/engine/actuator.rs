#![forbid(unsafe_code)]

use crate::diagnostics::Diagnostic;
use crate::domain::{ArmState, ChangeSource, Intervention, changed_by};
use crate::engine::AutoArmEngine;
use crate::host::HostError;
use tracing::{debug, error, info};

impl AutoArmEngine {
    /// Move the panel to `target`. Returns the new state when the panel was
    /// changed, `None` when nothing was done.
    pub async fn arm(
        &mut self,
        target: Option<ArmState>,
        source: Option<ChangeSource>,
    ) -> Option<ArmState> {
        let target = target?;
        if self.armed_state() == target {
            return None;
        }
        let now = self.now();
        if self.limiter.triggered(now) {
            debug!(?source, %target, "rate limit triggered, skipping arm");
            return None;
        }

        self.arming_in_progress = true;
        let result = self.commit(target, source).await;
        self.arming_in_progress = false;

        match result {
            Ok(state) => state,
            Err(err) => {
                error!(%err, %target, "failed to arm");
                self.health.record_runtime_error();
                None
            }
        }
    }

    async fn commit(
        &mut self,
        target: ArmState,
        source: Option<ChangeSource>,
    ) -> Result<Option<ArmState>, HostError> {
        let existing = self.armed_state();
        if existing == target {
            debug!(?source, %target, "panel already there, skipping arm");
            return Ok(Some(existing));
        }

        let panel = &self.config.alarm_panel.entity_id;
        self.services
            .panel
            .set_panel_state(panel, target, &changed_by(source))
            .await?;
        info!(%panel, from = %existing, to = %target, ?source, "panel state set");

        if let Some(source) = source {
            self.notify(source, Some(existing), Some(target), None, None)
                .await;
        }
        Ok(Some(target))
    }

    /// Park the panel in pending, remembering where it was, so the next
    /// recompute is free to pick any state.
    pub async fn pending_state(&mut self, source: Option<ChangeSource>) -> Option<ArmState> {
        self.pre_pending_state = Some(self.armed_state());
        self.arm(Some(ArmState::Pending), source).await
    }

    pub(crate) async fn notify(
        &mut self,
        source: ChangeSource,
        from: Option<ArmState>,
        to: Option<ArmState>,
        message: Option<String>,
        title: Option<String>,
    ) {
        let Some(notification) = self.notifier.compose(source, from, to, message, title) else {
            return;
        };
        if let Err(err) = self.services.notifications.send(&notification).await {
            error!(%err, service = %notification.service, "notification failed");
            self.health.record_runtime_error();
        }
    }

    pub(crate) fn record_intervention(
        &mut self,
        source: ChangeSource,
        state: Option<ArmState>,
    ) -> Intervention {
        let now = self.now();
        let intervention = self.ledger.record(source, state, now);
        self.services
            .diagnostics
            .publish(Diagnostic::LastIntervention(intervention.clone()));
        intervention
    }
}
