#![forbid(unsafe_code)]

use crate::diagnostics::{Diagnostic, HealthReport};
use crate::host::DiagnosticsSink;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Counts what went wrong since startup and publishes the tally.
pub struct HealthTracker {
    sink: Arc<dyn DiagnosticsSink>,
    initialization_errors: BTreeMap<String, u32>,
    failures: u32,
    initialized: bool,
}

impl HealthTracker {
    pub fn new(sink: Arc<dyn DiagnosticsSink>) -> Self {
        Self {
            sink,
            initialization_errors: BTreeMap::new(),
            failures: 0,
            initialized: false,
        }
    }

    pub fn record_initialization_error(&mut self, stage: &str) {
        *self
            .initialization_errors
            .entry(stage.to_owned())
            .or_default() += 1;
        self.failures += 1;
        warn!(stage, failures = self.failures, "initialization error");
        self.publish();
    }

    pub fn record_runtime_error(&mut self) {
        self.failures += 1;
        self.publish();
    }

    pub fn app_initialized(&mut self) {
        self.initialized = true;
        self.publish();
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn report(&self) -> HealthReport {
        HealthReport {
            initialized: self
                .initialized
                .then(|| self.initialization_errors.is_empty()),
            failures: self.failures,
            initialization_errors: self.initialization_errors.clone(),
        }
    }

    fn publish(&self) {
        self.sink.publish(Diagnostic::Health(self.report()));
    }
}
