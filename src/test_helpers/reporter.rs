//! A failure reporter that keeps every report for later inspection.

use std::sync::Mutex;

use crate::engine::reporter::{DeliveryFailure, FailureReporter};

/// Collects reported delivery failures.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    failures: Mutex<Vec<DeliveryFailure>>,
}

impl RecordingReporter {
    /// Creates an empty reporter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the failures reported so far.
    pub fn failures(&self) -> Vec<DeliveryFailure> {
        self.failures.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, failure: &DeliveryFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            failures.push(failure.clone());
        }
    }
}
