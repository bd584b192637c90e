use crate::registry::CheckOutcome;
use crate::types::CheckStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;

// ---------------------------------------------------------------------------
// DiagnosticReport
// ---------------------------------------------------------------------------

/// Aggregate result of one diagnostic run, in production order. This shape
/// is the external contract; rendering lives in the CLI.
#[derive(Debug, Serialize)]
pub struct DiagnosticReport {
    pub timestamp: DateTime<Utc>,
    pub checks_run: usize,
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<CheckOutcome>,
}

impl DiagnosticReport {
    pub fn new(outcomes: Vec<CheckOutcome>) -> Self {
        let count = |s: CheckStatus| outcomes.iter().filter(|o| o.status == s).count();
        Self {
            timestamp: Utc::now(),
            checks_run: outcomes.len(),
            passed: count(CheckStatus::Pass),
            warned: count(CheckStatus::Warn),
            failed: count(CheckStatus::Fail),
            skipped: count(CheckStatus::Skip),
            outcomes,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
