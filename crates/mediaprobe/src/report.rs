//! Summary of a full run over the catalog.

use crate::evaluator::TestResult;
use crate::registry::{TestId, Tier};
use crate::result::ProbeResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

/// How one test ended within a suite run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// The test ran to a verdict
    Verdict {
        /// Verdict
        result: TestResult,
    },
    /// The platform precondition was unmet; the test did not execute
    Unsupported {
        /// Lowest platform level the test runs on
        required: u32,
    },
    /// The coordinator refused to start the test
    Rejected {
        /// Reason
        message: String,
    },
}

/// One row of a suite report
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    /// Test id
    pub id: TestId,
    /// Display name
    pub name: String,
    /// Tier
    pub tier: Tier,
    /// How the test ended
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Wall time spent on the test
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl TestOutcome {
    fn verdict(&self) -> Option<TestResult> {
        match self.outcome {
            Outcome::Verdict { result } => Some(result),
            _ => None,
        }
    }
}

/// Results of running every test in the catalog
#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    /// Unique id of this run
    pub run_id: Uuid,
    /// Package of the target application
    pub package: String,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Per-test outcomes in id order
    pub outcomes: Vec<TestOutcome>,
    /// Total duration
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

impl SuiteReport {
    /// Start an empty report
    #[must_use]
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            package: package.into(),
            started_at: Utc::now(),
            outcomes: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    /// Record one outcome
    pub fn push(&mut self, outcome: TestOutcome) {
        self.outcomes.push(outcome);
    }

    fn count(&self, result: TestResult) -> usize {
        self.outcomes.iter().filter(|o| o.verdict() == Some(result)).count()
    }

    /// Count passed tests
    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(TestResult::Pass)
    }

    /// Count failed tests
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(TestResult::Fail)
    }

    /// Count tests missing recommended behavior
    #[must_use]
    pub fn optional_failed_count(&self) -> usize {
        self.count(TestResult::OptionalFail)
    }

    /// Count tests that could not run on this platform
    #[must_use]
    pub fn unsupported_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Unsupported { .. }))
            .count()
    }

    /// Get total test count
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// No test failed or was refused
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(|o| {
            matches!(
                o.outcome,
                Outcome::Verdict {
                    result: TestResult::Pass | TestResult::OptionalFail
                } | Outcome::Unsupported { .. }
            )
        })
    }

    /// Pretty-printed JSON rendering
    pub fn to_json(&self) -> ProbeResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Get failed or refused tests
    #[must_use]
    pub fn failures(&self) -> Vec<&TestOutcome> {
        self.outcomes
            .iter()
            .filter(|o| {
                matches!(
                    o.outcome,
                    Outcome::Verdict { result: TestResult::Fail } | Outcome::Rejected { .. }
                )
            })
            .collect()
    }
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}
