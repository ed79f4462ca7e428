//! Execution coordinator.
//!
//! Admits one test at a time, gives every run a fresh log, and writes the
//! verdict back into the catalog. All host-visible state (the catalog, the
//! running slot, the run logs) is exposed as latest-value streams.

use crate::config::ProbeConfig;
use crate::evaluator::{EvalContext, TestLogger, TestResult};
use crate::lock_unpoisoned;
use crate::registry::{build_tests, DisplayText, TestDefinition, TestId};
use crate::report::{Outcome, SuiteReport, TestOutcome};
use crate::result::{ProbeError, ProbeResult};
use crate::session::SessionHandle;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Which test, if any, holds the running slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    /// No test running
    #[default]
    Idle,
    /// This test is running
    Running(TestId),
}

type RunLog = Arc<watch::Sender<Vec<String>>>;

/// Runs tests against one connected session
pub struct TestCoordinator {
    session: SessionHandle,
    config: ProbeConfig,
    tests: watch::Sender<Vec<TestDefinition>>,
    running: watch::Sender<RunningState>,
    logs: Mutex<HashMap<TestId, RunLog>>,
}

impl fmt::Debug for TestCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCoordinator")
            .field("session", &self.session)
            .field("running", &*self.running.borrow())
            .field("tests", &self.tests.borrow().len())
            .finish_non_exhaustive()
    }
}

impl TestCoordinator {
    /// Coordinate an explicit catalog
    #[must_use]
    pub fn new(session: SessionHandle, tests: Vec<TestDefinition>, config: ProbeConfig) -> Arc<Self> {
        Arc::new(Self {
            session,
            config,
            tests: watch::channel(tests).0,
            running: watch::channel(RunningState::Idle).0,
            logs: Mutex::new(HashMap::new()),
        })
    }

    /// Coordinate the catalog the session's target is entitled to
    #[must_use]
    pub fn for_session(session: SessionHandle, text: &dyn DisplayText, config: ProbeConfig) -> Arc<Self> {
        let tests = build_tests(session.target(), text);
        Self::new(session, tests, config)
    }

    /// Session the tests run against
    #[must_use]
    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Observe the catalog, including verdicts
    #[must_use]
    pub fn tests(&self) -> watch::Receiver<Vec<TestDefinition>> {
        self.tests.subscribe()
    }

    /// Current catalog
    #[must_use]
    pub fn test_list(&self) -> Vec<TestDefinition> {
        self.tests.borrow().clone()
    }

    /// Observe the running slot
    #[must_use]
    pub fn running(&self) -> watch::Receiver<RunningState> {
        self.running.subscribe()
    }

    /// Current running slot
    #[must_use]
    pub fn running_state(&self) -> RunningState {
        *self.running.borrow()
    }

    /// Latest verdict of a test
    pub fn result(&self, test_id: TestId) -> ProbeResult<TestResult> {
        self.tests
            .borrow()
            .iter()
            .find(|t| t.id == test_id)
            .map(|t| t.result)
            .ok_or(ProbeError::UnknownTest { test_id })
    }

    /// Observe the log of the latest run of a test
    pub fn log(&self, test_id: TestId) -> ProbeResult<watch::Receiver<Vec<String>>> {
        lock_unpoisoned(&self.logs)
            .get(&test_id)
            .map(|log| log.subscribe())
            .ok_or(ProbeError::NoRunLog { test_id })
    }

    /// Entries of the latest run of a test, newest first
    pub fn log_entries(&self, test_id: TestId) -> ProbeResult<Vec<String>> {
        Ok(self.log(test_id)?.borrow().clone())
    }

    /// Start a test.
    ///
    /// Fails synchronously with [`ProbeError::UnknownTest`],
    /// [`ProbeError::UnsupportedPlatform`] or [`ProbeError::AlreadyRunning`];
    /// none of these touch the running slot or any log.
    pub fn run_test(self: &Arc<Self>, test_id: TestId, query: impl Into<String>) -> ProbeResult<RunTicket> {
        let definition = self
            .tests
            .borrow()
            .iter()
            .find(|t| t.id == test_id)
            .cloned()
            .ok_or(ProbeError::UnknownTest { test_id })?;
        definition.check_platform(self.config.platform_level)?;

        let mut holder = None;
        self.running.send_if_modified(|state| match *state {
            RunningState::Running(running) => {
                holder = Some(running);
                false
            }
            RunningState::Idle => {
                *state = RunningState::Running(test_id);
                true
            }
        });
        if let Some(running) = holder {
            tracing::debug!(test_id, running, "run rejected, slot taken");
            return Err(ProbeError::AlreadyRunning { running });
        }

        let log = self.fresh_log(test_id);
        let query = query.into();
        tracing::info!(test_id, name = %definition.name, query = %query, "starting test");

        let ctx = EvalContext {
            test_id,
            session: self.session.clone(),
            query,
            log: TestLogger::new(test_id, log),
            timeout: self.config.timeout(),
        };
        let evaluator = definition.evaluator();
        let guard = RunGuard {
            coordinator: Arc::clone(self),
            test_id,
            recorded: false,
        };
        let task = tokio::spawn(async move {
            let result = evaluator.evaluate(&ctx).await;
            guard.finish(result);
            result
        });
        Ok(RunTicket { test_id, task })
    }

    /// Run every test in id order, one after another.
    ///
    /// Tests gated above the configured platform level are reported as
    /// unsupported and not executed.
    pub async fn run_all<F>(self: &Arc<Self>, query_for: F) -> SuiteReport
    where
        F: Fn(&TestDefinition) -> String,
    {
        let started = Instant::now();
        let mut report = SuiteReport::new(self.session.target().package.clone());

        for definition in self.test_list() {
            let test_started = Instant::now();
            let outcome = match self.run_test(definition.id, query_for(&definition)) {
                Ok(ticket) => Outcome::Verdict {
                    result: ticket.finish().await,
                },
                Err(ProbeError::UnsupportedPlatform { required, .. }) => {
                    tracing::info!(test_id = definition.id, required, "skipping gated test");
                    Outcome::Unsupported { required }
                }
                Err(err) => Outcome::Rejected {
                    message: err.to_string(),
                },
            };
            report.push(TestOutcome {
                id: definition.id,
                name: definition.name.clone(),
                tier: definition.tier,
                outcome,
                duration: test_started.elapsed(),
            });
        }

        report.duration = started.elapsed();
        tracing::info!(
            passed = report.passed_count(),
            failed = report.failed_count(),
            optional = report.optional_failed_count(),
            unsupported = report.unsupported_count(),
            "suite finished"
        );
        report
    }

    /// Replace the log of `test_id` with an empty one, keeping its observers
    fn fresh_log(&self, test_id: TestId) -> RunLog {
        let mut logs = lock_unpoisoned(&self.logs);
        let log = logs
            .entry(test_id)
            .or_insert_with(|| Arc::new(watch::channel(Vec::new()).0));
        log.send_replace(Vec::new());
        Arc::clone(log)
    }

    fn record(&self, test_id: TestId, result: TestResult) {
        self.tests.send_modify(|tests| {
            if let Some(test) = tests.iter_mut().find(|t| t.id == test_id) {
                test.result = result;
            }
        });
    }

    fn release(&self, test_id: TestId) {
        self.running.send_if_modified(|state| {
            if *state == RunningState::Running(test_id) {
                *state = RunningState::Idle;
                true
            } else {
                false
            }
        });
    }
}

/// Writes the verdict, then frees the running slot. A run that dies
/// without a verdict is recorded as FAIL.
struct RunGuard {
    coordinator: Arc<TestCoordinator>,
    test_id: TestId,
    recorded: bool,
}

impl RunGuard {
    fn finish(mut self, result: TestResult) {
        tracing::info!(test_id = self.test_id, %result, "test finished");
        self.coordinator.record(self.test_id, result);
        self.recorded = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.recorded {
            tracing::warn!(test_id = self.test_id, "test ended without a verdict");
            self.coordinator.record(self.test_id, TestResult::Fail);
        }
        self.coordinator.release(self.test_id);
    }
}

/// Handle on an admitted run
#[derive(Debug)]
pub struct RunTicket {
    test_id: TestId,
    task: JoinHandle<TestResult>,
}

impl RunTicket {
    /// Test being run
    #[must_use]
    pub const fn test_id(&self) -> TestId {
        self.test_id
    }

    /// Wait for the verdict
    pub async fn finish(self) -> TestResult {
        self.task.await.unwrap_or(TestResult::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        MetadataSnapshot, PlaybackState, PlaybackStateSnapshot, QueueItem, SessionEvent,
        TargetApplication,
    };
    use crate::registry::StaticDisplayText;
    use crate::sim::testing::connect;
    use crate::sim::TargetProfile;

    fn profile(target: TargetApplication) -> TargetProfile {
        TargetProfile::new(target)
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Paused, 30_000).with_active_item(1))
            .with_metadata(MetadataSnapshot::new("a", "Song A"))
            .with_queue(vec![QueueItem::new(1, "a", "Song A"), QueueItem::new(2, "b", "Song B")])
    }

    fn basic() -> TargetProfile {
        profile(TargetApplication::new("com.example.player"))
    }

    async fn coordinator(
        profile: TargetProfile,
        config: ProbeConfig,
    ) -> (crate::session::SessionManager, Arc<TestCoordinator>) {
        let (_endpoint, manager, session) = connect(profile).await;
        (manager, TestCoordinator::for_session(session, &StaticDisplayText, config))
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_records_verdict_and_frees_slot() {
        let (_manager, coordinator) = coordinator(basic(), ProbeConfig::default()).await;
        let mut running = coordinator.running();

        let ticket = coordinator.run_test(0, "").unwrap();
        assert_eq!(*running.borrow_and_update(), RunningState::Running(0));
        assert_eq!(ticket.finish().await, TestResult::Pass);

        assert_eq!(coordinator.running_state(), RunningState::Idle);
        assert_eq!(coordinator.result(0).unwrap(), TestResult::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_run_rejected_while_running() {
        let profile = basic().with_reaction("play", Vec::new());
        let (_manager, coordinator) = coordinator(profile, ProbeConfig::default()).await;

        let ticket = coordinator.run_test(0, "").unwrap();
        let log_before = coordinator.log_entries(0).unwrap();

        let err = coordinator.run_test(4, "").unwrap_err();
        assert!(matches!(err, ProbeError::AlreadyRunning { running: 0 }));
        assert_eq!(coordinator.running_state(), RunningState::Running(0));
        assert!(matches!(coordinator.log(4), Err(ProbeError::NoRunLog { test_id: 4 })));
        assert_eq!(coordinator.log_entries(0).unwrap(), log_before);

        assert_eq!(ticket.finish().await, TestResult::Fail);
        assert_eq!(coordinator.running_state(), RunningState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_fails_running_test() {
        let profile = basic().with_reaction("play", Vec::new());
        let (manager, coordinator) = coordinator(profile, ProbeConfig::default()).await;

        let ticket = coordinator.run_test(0, "").unwrap();
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;
        manager.disconnect();

        assert_eq!(ticket.finish().await, TestResult::Fail);
        assert_eq!(coordinator.running_state(), RunningState::Idle);
        assert_eq!(coordinator.result(0).unwrap(), TestResult::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_run_replaces_log() {
        let (_manager, coordinator) = coordinator(basic(), ProbeConfig::default()).await;
        let mut log = {
            coordinator.run_test(9, "abs").unwrap().finish().await;
            coordinator.log(9).unwrap()
        };
        let first = log.borrow_and_update().clone();
        assert!(first[0].contains("<Invalid query>"));

        coordinator.run_test(9, "+15").unwrap().finish().await;
        let second = log.borrow_and_update().clone();
        assert!(second.iter().all(|entry| !entry.contains("<Invalid query>")));
        assert!(second[0].contains("<Verdict>"));
        assert!(second.last().unwrap().contains("<Starting state>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_test_rejected() {
        let (_manager, coordinator) = coordinator(basic(), ProbeConfig::default()).await;
        assert!(matches!(
            coordinator.run_test(12, ""),
            Err(ProbeError::UnknownTest { test_id: 12 })
        ));
        assert_eq!(coordinator.running_state(), RunningState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_platform_gate_leaves_state_untouched() {
        let target = TargetApplication::new("com.example.player").with_common();
        let config = ProbeConfig::default().with_platform_level(21);
        let (_manager, coordinator) = coordinator(profile(target), config).await;

        let err = coordinator.run_test(10, "").unwrap_err();
        assert!(matches!(err, ProbeError::UnsupportedPlatform { test_id: 10, required: 24, actual: 21 }));
        assert_eq!(coordinator.running_state(), RunningState::Idle);
        assert!(coordinator.log(10).is_err());
        assert_eq!(coordinator.result(10).unwrap(), TestResult::None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_configurable() {
        let profile = basic().with_reaction("play", Vec::new());
        let config = ProbeConfig::default().with_timeout_ms(2_000);
        let (_manager, coordinator) = coordinator(profile, config).await;

        let started = tokio::time::Instant::now();
        assert_eq!(coordinator.run_test(0, "").unwrap().finish().await, TestResult::Fail);
        let elapsed = started.elapsed();
        assert!(elapsed >= std::time::Duration::from_secs(2));
        assert!(elapsed < std::time::Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_tests_stream_sees_verdict() {
        let (_manager, coordinator) = coordinator(basic(), ProbeConfig::default()).await;
        let mut tests = coordinator.tests();
        tests.borrow_and_update();

        coordinator.run_test(4, "").unwrap().finish().await;
        assert!(tests.has_changed().unwrap());
        let pause = tests.borrow_and_update().iter().find(|t| t.id == 4).cloned().unwrap();
        assert_eq!(pause.result, TestResult::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_all_reports_every_test() {
        let target = TargetApplication::new("com.example.player").with_extended();
        let profile = profile(target)
            .with_children("root", vec![crate::model::BrowseItem::browsable("music", "Music")])
            .with_reaction(
                "skip_to_previous",
                vec![SessionEvent::Playback(Some(PlaybackStateSnapshot::new(PlaybackState::Stopped, 0)))],
            );
        let config = ProbeConfig::default().with_platform_level(23);
        let (_manager, coordinator) = coordinator(profile, config).await;

        let report = coordinator
            .run_all(|test| match test.id {
                2 => "b".to_string(),
                3 => "https://example.com/b.mp3".to_string(),
                8 => "2".to_string(),
                9 => "+15".to_string(),
                _ => String::new(),
            })
            .await;

        assert_eq!(report.total(), 20);
        assert_eq!(report.unsupported_count(), 3);
        assert!(report.failures().iter().any(|o| o.id == 7));
        assert_eq!(coordinator.running_state(), RunningState::Idle);
        for gated in [10, 11, 16] {
            assert_eq!(coordinator.result(gated).unwrap(), TestResult::None);
        }
    }
}
