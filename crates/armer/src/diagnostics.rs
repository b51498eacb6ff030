#![forbid(unsafe_code)]

use crate::domain::{ArmState, CalendarEvent, ChangeSource, Intervention};
use crate::host::DiagnosticsSink;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Outcome of one recompute, published whether or not it changed anything.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalculationRecord {
    pub changed: bool,
    pub old: Option<ArmState>,
    pub new: Option<ArmState>,
    pub source: Option<ChangeSource>,
    pub active_calendar_event: Option<CalendarEvent>,
    pub occupied: Option<bool>,
    pub night: Option<bool>,
    pub must_change: bool,
    pub last_state_intervention: Option<Intervention>,
    pub intervention: Option<Intervention>,
    pub time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CalendarEventRecord {
    pub calendar: String,
    pub summary: String,
    pub description: Option<String>,
    pub uid: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub new_state: Option<ArmState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// `None` until initialization has finished.
    pub initialized: Option<bool>,
    pub failures: u32,
    pub initialization_errors: BTreeMap<String, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    LastCalculation(CalculationRecord),
    LastIntervention(Intervention),
    LastCalendarEvent(CalendarEventRecord),
    Health(HealthReport),
}

/// Writes every diagnostic to the log as JSON.
#[derive(Debug, Default)]
pub struct TracingDiagnostics;

impl DiagnosticsSink for TracingDiagnostics {
    fn publish(&self, diagnostic: Diagnostic) {
        match serde_json::to_string(&diagnostic) {
            Ok(json) => info!(target: "autoarm::diagnostics", "{json}"),
            Err(err) => warn!(%err, "failed to serialize diagnostic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn diagnostics_are_tagged() {
        let report = Diagnostic::Health(HealthReport {
            initialized: Some(true),
            failures: 2,
            initialization_errors: BTreeMap::from([("calendar_setup".to_owned(), 1)]),
        });
        assert_eq!(
            serde_json::to_value(&report).unwrap(),
            json!({
                "kind": "health",
                "initialized": true,
                "failures": 2,
                "initialization_errors": {"calendar_setup": 1},
            })
        );
    }
}
