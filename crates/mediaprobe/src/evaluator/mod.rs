//! Test evaluators: the per-test state machines.
//!
//! An evaluator receives an explicit session handle, the free-text query
//! and a log sink, and resolves to exactly one [`TestResult`]. Evaluators
//! never block: they suspend on the next session change and give up on
//! timeout or when the session is torn down.

mod capability;
mod query;
mod transport;

pub use capability::{CapabilityCheck, CapabilityTest, MAX_BROWSE_DEPTH, MAX_ROOT_CHILDREN};
pub use query::{parse_queue_item_id, parse_seek_query, require_query, SeekQuery};
pub use transport::{StartingState, TransportKind, TransportTest};

use crate::registry::TestId;
use crate::result::ProbeError;
use crate::session::SessionHandle;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Verdict of one test run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    /// Not run yet
    #[default]
    None,
    /// Passed
    Pass,
    /// Failed
    Fail,
    /// Recommended behavior missing
    OptionalFail,
}

impl TestResult {
    /// Short label
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::OptionalFail => "OPTIONAL_FAIL",
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Appends timestamped, tagged entries to one run's log, newest first
#[derive(Debug, Clone)]
pub struct TestLogger {
    test_id: TestId,
    sink: Arc<watch::Sender<Vec<String>>>,
}

impl TestLogger {
    /// Log into an existing run log
    #[must_use]
    pub fn new(test_id: TestId, sink: Arc<watch::Sender<Vec<String>>>) -> Self {
        Self { test_id, sink }
    }

    /// Log into a fresh run log nobody else observes yet
    #[must_use]
    pub fn detached(test_id: TestId) -> Self {
        Self::new(test_id, Arc::new(watch::channel(Vec::new()).0))
    }

    /// Append an entry
    pub fn log(&self, tag: &str, message: impl AsRef<str>) {
        let message = message.as_ref();
        tracing::debug!(test_id = self.test_id, tag, "{message}");
        let entry = format!(
            "[{}] <{tag}>:\n{message}",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f")
        );
        self.sink.send_modify(|entries| entries.insert(0, entry));
    }

    /// Entries so far, newest first
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.sink.borrow().clone()
    }

    /// Observe the log
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<String>> {
        self.sink.subscribe()
    }
}

/// Everything an evaluator may touch during one run
#[derive(Debug, Clone)]
pub struct EvalContext {
    /// Test being run
    pub test_id: TestId,
    /// Connected session
    pub session: SessionHandle,
    /// Free-text query
    pub query: String,
    /// Run log sink
    pub log: TestLogger,
    /// Upper bound for reaching a verdict
    pub timeout: Duration,
}

/// Evaluation procedure of one test definition
#[async_trait]
pub trait Evaluator: Send + Sync + fmt::Debug {
    /// Run the test to a verdict
    async fn evaluate(&self, ctx: &EvalContext) -> TestResult;
}

/// Log a session error under a tag that tells teardown from rejection
pub(crate) fn log_error(log: &TestLogger, err: &ProbeError) {
    let tag = if err.is_lifecycle() { "Disconnected" } else { "Error" };
    log.log(tag, err.to_string());
}

/// Run `evaluation`, resolving to FAIL on timeout or session teardown
pub(crate) async fn bounded<F>(ctx: &EvalContext, evaluation: F) -> TestResult
where
    F: Future<Output = TestResult> + Send,
{
    let cancelled = ctx.session.cancellation();
    tokio::select! {
        biased;
        () = cancelled.cancelled() => {
            tracing::warn!(test_id = ctx.test_id, "session torn down mid-test");
            ctx.log.log("Cancelled", "Session disconnected before a verdict was reached");
            TestResult::Fail
        }
        () = tokio::time::sleep(ctx.timeout) => {
            let err = ProbeError::Timeout {
                ms: u64::try_from(ctx.timeout.as_millis()).unwrap_or(u64::MAX),
            };
            tracing::warn!(test_id = ctx.test_id, error = %err, "test timed out");
            ctx.log.log("Timeout", format!("{err} without a qualifying terminal state"));
            TestResult::Fail
        }
        result = evaluation => result,
    }
}
