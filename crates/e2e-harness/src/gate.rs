//! Exit gate: turns a run outcome into a pass/fail verdict.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::summary::{load_summary, FailureTally};

/// Message reported whenever the gate fails.
pub const FAILING_TESTS: &str = "Failing tests";

/// Overall result of an orchestration run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Every check passed (`checks` may be zero).
    Passed { checks: usize },

    /// At least one check had failures.
    TestsFailed { failed: Vec<String> },

    /// The run could not produce a trustworthy result.
    InfrastructureError { reason: String },
}

impl RunOutcome {
    pub fn from_tally(tally: &FailureTally) -> Self {
        if tally.has_failures() {
            RunOutcome::TestsFailed {
                failed: tally.failed().to_vec(),
            }
        } else {
            RunOutcome::Passed {
                checks: tally.total(),
            }
        }
    }

    pub fn infrastructure(reason: impl std::fmt::Display) -> Self {
        RunOutcome::InfrastructureError {
            reason: reason.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Passed { .. })
    }
}

/// Gate evaluation verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GateVerdict {
    /// Whether the gate passed.
    pub passed: bool,

    /// Violations that caused failure (empty if passed).
    pub violations: Vec<String>,

    /// Summary message.
    pub message: String,
}

/// Exit gate rules.
pub struct ExitGate;

impl ExitGate {
    /// Evaluate a run outcome.
    ///
    /// Gate rule:
    /// - `Passed` passes
    /// - `TestsFailed` fails with one violation per failed check
    /// - `InfrastructureError` fails with the error as its only violation
    pub fn evaluate(outcome: &RunOutcome) -> GateVerdict {
        let violations = match outcome {
            RunOutcome::Passed { .. } => Vec::new(),
            RunOutcome::TestsFailed { failed } => failed
                .iter()
                .map(|name| format!("Test failed: {name}"))
                .collect(),
            RunOutcome::InfrastructureError { reason } => vec![reason.clone()],
        };

        let passed = outcome.is_success();
        let message = match outcome {
            RunOutcome::Passed { checks } => format!("All {checks} check(s) passed"),
            _ => FAILING_TESTS.to_string(),
        };

        GateVerdict {
            passed,
            violations,
            message,
        }
    }

    /// Evaluate a persisted summary file.
    ///
    /// A missing or undecodable file fails the gate.
    pub fn evaluate_file(path: &Path) -> (RunOutcome, GateVerdict) {
        let outcome = match load_summary(path) {
            Ok(summary) => {
                let mut tally = FailureTally::new();
                tally.record(&summary);
                RunOutcome::from_tally(&tally)
            }
            Err(e) => RunOutcome::infrastructure(e),
        };
        let verdict = Self::evaluate(&outcome);
        (outcome, verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::summary::TestSummary;

    #[test]
    fn test_passed_outcome() {
        let verdict = ExitGate::evaluate(&RunOutcome::Passed { checks: 3 });
        assert!(verdict.passed);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn test_failed_checks() {
        let verdict = ExitGate::evaluate(&RunOutcome::TestsFailed {
            failed: vec!["b".to_string()],
        });
        assert!(!verdict.passed);
        assert_eq!(verdict.message, FAILING_TESTS);
        assert_eq!(verdict.violations, ["Test failed: b"]);
    }

    #[test]
    fn test_infrastructure_error() {
        let verdict = ExitGate::evaluate(&RunOutcome::infrastructure("k6 exited with 107"));
        assert!(!verdict.passed);
        assert_eq!(verdict.violations, ["k6 exited with 107"]);
    }

    #[test]
    fn test_outcome_from_tally() {
        let summary = TestSummary::from_slice(
            br#"{"root_group":{"checks":[{"name":"a","passes":1,"fails":0}]}}"#,
        )
        .unwrap();
        let mut tally = FailureTally::new();
        tally.record(&summary);
        assert_eq!(RunOutcome::from_tally(&tally), RunOutcome::Passed { checks: 1 });
    }

    #[test]
    fn test_evaluate_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (outcome, verdict) = ExitGate::evaluate_file(&dir.path().join("test_summary.json"));
        assert!(matches!(outcome, RunOutcome::InfrastructureError { .. }));
        assert!(!verdict.passed);
        assert!(verdict.violations[0].contains("no test results"));
    }

    #[test]
    fn test_evaluate_file_with_failures() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_summary.json");
        std::fs::write(
            &path,
            r#"{"root_group":{"checks":[{"name":"a","passes":1,"fails":0},{"name":"b","passes":0,"fails":1}]}}"#,
        )
        .unwrap();

        let (outcome, verdict) = ExitGate::evaluate_file(&path);
        assert_eq!(
            outcome,
            RunOutcome::TestsFailed {
                failed: vec!["b".to_string()]
            }
        );
        assert_eq!(verdict.message, FAILING_TESTS);
    }

    #[test]
    fn test_evaluate_file_with_no_checks_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test_summary.json");
        std::fs::write(&path, r#"{"root_group":{"checks":[]}}"#).unwrap();

        let (_, verdict) = ExitGate::evaluate_file(&path);
        assert!(verdict.passed);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(RunOutcome::Passed { checks: 2 }).unwrap();
        assert_eq!(json, serde_json::json!({"status": "passed", "checks": 2}));
    }
}
