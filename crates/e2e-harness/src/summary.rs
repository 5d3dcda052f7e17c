//! k6 summary decoding and failure aggregation.
//!
//! The k6 script writes `test_summary.json` from `handleSummary`. Only the
//! root group's checks matter here:
//!
//! ```json
//! {"root_group": {"checks": [{"name": "a", "passes": 1, "fails": 0}]}}
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use crate::error::SummaryError;

/// Decoded summary file. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TestSummary {
    #[serde(default)]
    pub root_group: RootGroup,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootGroup {
    #[serde(default)]
    pub checks: Vec<Check>,
}

/// A named k6 check with its pass/fail counts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    #[serde(default)]
    pub passes: u64,
    #[serde(default)]
    pub fails: u64,
}

impl Check {
    /// A check with any failure is failed, regardless of passes.
    pub fn failed(&self) -> bool {
        self.fails > 0
    }
}

impl TestSummary {
    /// Decode summary bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, SummaryError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn checks(&self) -> &[Check] {
        &self.root_group.checks
    }
}

/// Read and decode the summary file.
///
/// An absent file is [`SummaryError::Missing`], which is distinct from a
/// summary with no checks.
pub fn load_summary(path: &Path) -> Result<TestSummary, SummaryError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SummaryError::Missing {
                path: path.to_path_buf(),
            })
        }
        Err(source) => {
            return Err(SummaryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    TestSummary::from_slice(&bytes)
}

/// Delete a summary left over from a previous run.
///
/// Returns whether a file was removed.
pub fn remove_stale_summary(path: &Path) -> std::io::Result<bool> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            info!(path = %path.display(), "Stale test summary removed");
            Ok(true)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!(path = %path.display(), "No test summary file exists");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}

/// Failure counter for a single run.
///
/// Counts failed checks (not the sum of their failures) and keeps the names
/// of passed and failed checks in summary order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureTally {
    failures: usize,
    passed: Vec<String>,
    failed: Vec<String>,
}

impl FailureTally {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of failed checks recorded so far.
    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn passed(&self) -> &[String] {
        &self.passed
    }

    pub fn failed(&self) -> &[String] {
        &self.failed
    }

    /// Total checks recorded.
    pub fn total(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failures > 0
    }

    /// Fold every check of `summary` into the tally.
    pub fn record(&mut self, summary: &TestSummary) {
        for check in summary.checks() {
            if check.failed() {
                self.failures += 1;
                self.failed.push(check.name.clone());
                warn!(check = %check.name, fails = check.fails, "Test failed");
            } else {
                self.passed.push(check.name.clone());
                info!(check = %check.name, passes = check.passes, "Test passed");
            }
        }
    }

    /// Decode `bytes` and record the result.
    ///
    /// On a decode error the tally is left untouched.
    pub fn absorb(&mut self, bytes: &[u8]) -> Result<(), SummaryError> {
        let summary = TestSummary::from_slice(bytes)?;
        self.record(&summary);
        Ok(())
    }
}
