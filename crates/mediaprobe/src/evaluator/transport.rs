//! Transport-command tests.
//!
//! Each test dispatches one command and judges every following playback
//! and metadata change as continue, pass or fail. The acceptance policy is
//! fixed per command family:
//!
//! | Family | Passes on | Metadata rule |
//! |--------|-----------|---------------|
//! | play | `PLAYING` | unchanged, unless it started absent |
//! | play-from-* | `PLAYING` at 0 | any |
//! | pause | `PAUSED` (or `STOPPED` when started stopped) | unchanged, unless it started absent |
//! | stop | `STOPPED` or `NONE` | may only become absent or stay the same item |
//! | skip | `PLAYING` at 0 on a new item, or back to the starting state on the same item | an update is required |
//! | seek | any terminal state at the target position | any |
//!
//! Transitional states never decide anything. A terminal state equal to the
//! starting state is tolerated while waiting; any other terminal state fails.

use super::query::{parse_queue_item_id, parse_seek_query, require_query};
use super::{bounded, log_error, EvalContext, Evaluator, TestLogger, TestResult};
use crate::format::{format_metadata, format_playback_state, format_position};
use crate::model::{
    same_item, MetadataSnapshot, PlaybackState, PlaybackStateSnapshot, TransportCommand,
};
use crate::observe::{Change, ChangeStream};
use crate::registry::TestId;
use crate::result::ProbeResult;
use crate::session::SessionHandle;
use async_trait::async_trait;

/// Transport command exercised by a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// play()
    Play,
    /// playFromSearch(query)
    PlayFromSearch,
    /// playFromMediaId(query)
    PlayFromMediaId,
    /// playFromUri(query)
    PlayFromUri,
    /// pause()
    Pause,
    /// stop()
    Stop,
    /// skipToNext()
    SkipToNext,
    /// skipToPrevious()
    SkipToPrevious,
    /// skipToQueueItem(query)
    SkipToQueueItem,
    /// seekTo(query)
    SeekTo,
}

/// Acceptance policy of a command family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acceptance {
    Play,
    PlayFromStart,
    Pause,
    Stop,
    Skip,
    Seek { target_ms: u64 },
}

impl TransportKind {
    /// Turn the query into the command to dispatch and the policy to judge it by
    fn prepare(self, query: &str, start: &StartingState) -> ProbeResult<(Acceptance, TransportCommand)> {
        Ok(match self {
            Self::Play => (Acceptance::Play, TransportCommand::Play),
            Self::PlayFromSearch => (
                Acceptance::PlayFromStart,
                TransportCommand::PlayFromSearch {
                    query: query.trim().to_string(),
                },
            ),
            Self::PlayFromMediaId => (
                Acceptance::PlayFromStart,
                TransportCommand::PlayFromMediaId {
                    media_id: require_query(query, "media id")?.to_string(),
                },
            ),
            Self::PlayFromUri => (
                Acceptance::PlayFromStart,
                TransportCommand::PlayFromUri {
                    uri: require_query(query, "media URI")?.to_string(),
                },
            ),
            Self::Pause => (Acceptance::Pause, TransportCommand::Pause),
            Self::Stop => (Acceptance::Stop, TransportCommand::Stop),
            Self::SkipToNext => (Acceptance::Skip, TransportCommand::SkipToNext),
            Self::SkipToPrevious => (Acceptance::Skip, TransportCommand::SkipToPrevious),
            Self::SkipToQueueItem => (
                Acceptance::Skip,
                TransportCommand::SkipToQueueItem {
                    queue_id: parse_queue_item_id(query)?,
                },
            ),
            Self::SeekTo => {
                let target_ms = parse_seek_query(query)?.target_ms(start.position_ms());
                (
                    Acceptance::Seek { target_ms },
                    TransportCommand::SeekTo {
                        position_ms: target_ms,
                    },
                )
            }
        })
    }
}

/// Playback state and metadata captured right before dispatch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartingState {
    /// Playback state
    pub playback: Option<PlaybackStateSnapshot>,
    /// Metadata
    pub metadata: Option<MetadataSnapshot>,
}

impl StartingState {
    /// Capture from a live session
    pub fn capture(session: &SessionHandle) -> ProbeResult<Self> {
        Ok(Self {
            playback: session.playback_state()?,
            metadata: session.metadata()?,
        })
    }

    /// State tag; an absent playback state counts as `STATE_NONE`
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.playback.as_ref().map_or(PlaybackState::None, |p| p.state)
    }

    /// Position in milliseconds; zero when absent
    #[must_use]
    pub fn position_ms(&self) -> u64 {
        self.playback.as_ref().map_or(0, |p| p.position_ms)
    }
}

#[derive(Debug, Clone)]
struct Observed {
    playback: Option<PlaybackStateSnapshot>,
    metadata: Option<MetadataSnapshot>,
    metadata_updates: usize,
}

impl Observed {
    fn from_start(start: &StartingState) -> Self {
        Self {
            playback: start.playback.clone(),
            metadata: start.metadata.clone(),
            metadata_updates: 0,
        }
    }

    fn state(&self) -> PlaybackState {
        self.playback.as_ref().map_or(PlaybackState::None, |p| p.state)
    }

    fn position_ms(&self) -> u64 {
        self.playback.as_ref().map_or(0, |p| p.position_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Playback,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Continue,
    Pass(String),
    Fail(String),
}

fn describe(metadata: Option<&MetadataSnapshot>) -> String {
    metadata.map_or_else(|| "absent".to_string(), |m| format!("{:?}", m.media_id))
}

fn metadata_violation(
    acceptance: Acceptance,
    start: &StartingState,
    metadata: Option<&MetadataSnapshot>,
) -> Option<String> {
    match acceptance {
        Acceptance::Play | Acceptance::Pause => {
            let original = start.metadata.as_ref()?;
            if metadata.is_some_and(|m| m.same_item(original)) {
                None
            } else {
                Some(format!(
                    "metadata changed from {} to {}",
                    describe(Some(original)),
                    describe(metadata)
                ))
            }
        }
        Acceptance::Stop => match metadata {
            None => None,
            Some(m) if start.metadata.as_ref().is_some_and(|o| o.same_item(m)) => None,
            Some(m) => Some(format!(
                "metadata changed from {} to a different item {}",
                describe(start.metadata.as_ref()),
                describe(Some(m))
            )),
        },
        _ => None,
    }
}

fn judge(acceptance: Acceptance, start: &StartingState, observed: &Observed, trigger: Trigger) -> Step {
    if trigger == Trigger::Metadata {
        if let Some(reason) = metadata_violation(acceptance, start, observed.metadata.as_ref()) {
            return Step::Fail(reason);
        }
        if acceptance != Acceptance::Skip {
            return Step::Continue;
        }
    }

    let state = observed.state();
    if state.is_transitional() {
        return Step::Continue;
    }
    let position = observed.position_ms();
    let starting = start.state();
    let unexpected = |expected: &str| Step::Fail(format!("ended in {state}, expected {expected}"));

    match acceptance {
        Acceptance::Play => {
            if state == PlaybackState::Playing {
                Step::Pass("reached STATE_PLAYING".to_string())
            } else if state == starting {
                Step::Continue
            } else {
                unexpected("STATE_PLAYING")
            }
        }
        Acceptance::PlayFromStart => {
            if state == PlaybackState::Playing && position == 0 {
                Step::Pass("reached STATE_PLAYING at position 0".to_string())
            } else if state == starting {
                Step::Continue
            } else if state == PlaybackState::Playing {
                Step::Fail(format!(
                    "playing at {}, expected position 0",
                    format_position(position)
                ))
            } else {
                unexpected("STATE_PLAYING")
            }
        }
        Acceptance::Pause => {
            if state == PlaybackState::Paused {
                Step::Pass("reached STATE_PAUSED".to_string())
            } else if state == PlaybackState::Stopped && starting == PlaybackState::Stopped {
                Step::Pass("remained in STATE_STOPPED".to_string())
            } else if state == starting {
                Step::Continue
            } else {
                unexpected("STATE_PAUSED")
            }
        }
        Acceptance::Stop => {
            if matches!(state, PlaybackState::Stopped | PlaybackState::None) {
                Step::Pass(format!("reached {state}"))
            } else if state == starting {
                Step::Continue
            } else {
                unexpected("STATE_STOPPED or STATE_NONE")
            }
        }
        Acceptance::Skip => {
            let updated = observed.metadata_updates > 0;
            let changed_item = !same_item(start.metadata.as_ref(), observed.metadata.as_ref());
            if updated && !changed_item {
                if state == starting || (state == PlaybackState::Playing && position == 0) {
                    Step::Pass(format!("no item to skip to, session stayed in {state}"))
                } else if state == PlaybackState::Playing {
                    Step::Continue
                } else {
                    unexpected(&format!("{starting} on an unchanged item"))
                }
            } else if updated && state == PlaybackState::Playing && position == 0 {
                Step::Pass(format!(
                    "skipped to {} and started playing from 0",
                    describe(observed.metadata.as_ref())
                ))
            } else if state == PlaybackState::Playing || state == starting {
                Step::Continue
            } else {
                unexpected("STATE_PLAYING")
            }
        }
        Acceptance::Seek { target_ms } => {
            if state == PlaybackState::Error {
                unexpected(&format!("a playable state at {}", format_position(target_ms)))
            } else if position != target_ms {
                Step::Continue
            } else if state == starting {
                Step::Pass(format!(
                    "at {} and back in {state}",
                    format_position(target_ms)
                ))
            } else {
                Step::Pass(format!(
                    "at {} in {state} (started in {starting})",
                    format_position(target_ms)
                ))
            }
        }
    }
}

/// A test that dispatches one transport command and judges the reaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportTest {
    kind: TransportKind,
}

impl TransportTest {
    /// Create a test for a command
    #[must_use]
    pub const fn new(kind: TransportKind) -> Self {
        Self { kind }
    }

    /// Command exercised
    #[must_use]
    pub const fn kind(&self) -> TransportKind {
        self.kind
    }
}

#[async_trait]
impl Evaluator for TransportTest {
    async fn evaluate(&self, ctx: &EvalContext) -> TestResult {
        let start = match StartingState::capture(&ctx.session) {
            Ok(start) => start,
            Err(err) => {
                log_error(&ctx.log, &err);
                return TestResult::Fail;
            }
        };
        ctx.log.log(
            "Starting state",
            format!(
                "{}\n{}",
                format_playback_state(start.playback.as_ref()),
                format_metadata(start.metadata.as_ref())
            ),
        );

        let (acceptance, command) = match self.kind.prepare(&ctx.query, &start) {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::info!(test_id = ctx.test_id, error = %err, "query rejected");
                ctx.log.log("Invalid query", err.to_string());
                return TestResult::Fail;
            }
        };

        let changes = match ctx.session.changes() {
            Ok(changes) => changes,
            Err(err) => {
                log_error(&ctx.log, &err);
                return TestResult::Fail;
            }
        };
        if let Err(err) = ctx.session.dispatch(&command) {
            ctx.log.log("Error", format!("{command} was rejected: {err}"));
            return TestResult::Fail;
        }
        ctx.log.log("Command", command.to_string());

        bounded(
            ctx,
            observe_until_verdict(ctx.test_id, acceptance, &start, changes, &ctx.log),
        )
        .await
    }
}

async fn observe_until_verdict(
    test_id: TestId,
    acceptance: Acceptance,
    start: &StartingState,
    mut changes: ChangeStream,
    log: &TestLogger,
) -> TestResult {
    let mut observed = Observed::from_start(start);

    while let Some(change) = changes.next().await {
        let trigger = match change {
            Change::Playback(playback) => {
                log.log("Playback state changed", format_playback_state(playback.as_ref()));
                observed.playback = playback;
                Trigger::Playback
            }
            Change::Metadata(metadata) => {
                log.log("Metadata changed", format_metadata(metadata.as_ref()));
                observed.metadata = metadata;
                observed.metadata_updates += 1;
                Trigger::Metadata
            }
        };
        tracing::debug!(
            test_id,
            state = %observed.state(),
            position = observed.position_ms(),
            "observed change"
        );

        match judge(acceptance, start, &observed, trigger) {
            Step::Continue => {}
            Step::Pass(reason) => {
                tracing::info!(test_id, %reason, "test passed");
                log.log("Verdict", format!("PASS: {reason}"));
                return TestResult::Pass;
            }
            Step::Fail(reason) => {
                tracing::info!(test_id, %reason, "test failed");
                log.log("Verdict", format!("FAIL: {reason}"));
                return TestResult::Fail;
            }
        }
    }

    log.log("Verdict", "FAIL: session stopped reporting changes");
    TestResult::Fail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueueItem, SessionEvent, TargetApplication};
    use crate::sim::testing::connect;
    use crate::sim::TargetProfile;
    use std::time::Duration;

    fn playback(state: PlaybackState, position_ms: u64) -> Option<PlaybackStateSnapshot> {
        Some(PlaybackStateSnapshot::new(state, position_ms))
    }

    fn start(state: PlaybackState, position_ms: u64, media_id: Option<&str>) -> StartingState {
        StartingState {
            playback: playback(state, position_ms),
            metadata: media_id.map(|id| MetadataSnapshot::new(id, id)),
        }
    }

    fn observed(start: &StartingState, state: PlaybackState, position_ms: u64) -> Observed {
        Observed {
            playback: playback(state, position_ms),
            ..Observed::from_start(start)
        }
    }

    fn profile() -> TargetProfile {
        TargetProfile::new(TargetApplication::new("com.example.player"))
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Paused, 30_000).with_active_item(1))
            .with_metadata(MetadataSnapshot::new("a", "Song A"))
            .with_queue(vec![
                QueueItem::new(1, "a", "Song A"),
                QueueItem::new(2, "b", "Song B"),
                QueueItem::new(3, "c", "Song C"),
            ])
    }

    async fn run(profile: TargetProfile, kind: TransportKind, query: &str) -> (TestResult, Vec<String>, usize) {
        let (endpoint, _manager, session) = connect(profile).await;
        let ctx = EvalContext {
            test_id: 0,
            session,
            query: query.to_string(),
            log: TestLogger::detached(0),
            timeout: Duration::from_secs(30),
        };
        let result = TransportTest::new(kind).evaluate(&ctx).await;
        let dispatched = endpoint.controller().map_or(0, |c| c.dispatched().len());
        (result, ctx.log.entries(), dispatched)
    }

    #[test]
    fn test_play_judging() {
        let s = start(PlaybackState::Paused, 0, Some("a"));
        let step = |state| judge(Acceptance::Play, &s, &observed(&s, state, 0), Trigger::Playback);
        assert_eq!(step(PlaybackState::Buffering), Step::Continue);
        assert_eq!(step(PlaybackState::Paused), Step::Continue);
        assert!(matches!(step(PlaybackState::Playing), Step::Pass(_)));
        assert!(matches!(step(PlaybackState::Stopped), Step::Fail(_)));
    }

    #[test]
    fn test_play_metadata_must_not_change() {
        let s = start(PlaybackState::Paused, 0, Some("a"));
        let mut o = Observed::from_start(&s);
        o.metadata = Some(MetadataSnapshot::new("b", "b"));
        assert!(matches!(
            judge(Acceptance::Play, &s, &o, Trigger::Metadata),
            Step::Fail(_)
        ));

        let absent = start(PlaybackState::None, 0, None);
        let mut o = Observed::from_start(&absent);
        o.metadata = Some(MetadataSnapshot::new("b", "b"));
        assert_eq!(judge(Acceptance::Play, &absent, &o, Trigger::Metadata), Step::Continue);
    }

    #[test]
    fn test_stop_metadata_rules() {
        let s = start(PlaybackState::Playing, 5_000, Some("a"));
        let mut o = Observed::from_start(&s);

        o.metadata = None;
        assert_eq!(judge(Acceptance::Stop, &s, &o, Trigger::Metadata), Step::Continue);
        o.metadata = Some(MetadataSnapshot::new("a", "renamed"));
        assert_eq!(judge(Acceptance::Stop, &s, &o, Trigger::Metadata), Step::Continue);
        o.metadata = Some(MetadataSnapshot::new("b", "b"));
        assert!(matches!(
            judge(Acceptance::Stop, &s, &o, Trigger::Metadata),
            Step::Fail(_)
        ));
    }

    #[test]
    fn test_pause_from_stopped() {
        let s = start(PlaybackState::Stopped, 0, None);
        let o = observed(&s, PlaybackState::Stopped, 0);
        assert!(matches!(judge(Acceptance::Pause, &s, &o, Trigger::Playback), Step::Pass(_)));
    }

    #[test]
    fn test_skip_requires_metadata_update() {
        let s = start(PlaybackState::Paused, 10_000, Some("a"));
        let o = observed(&s, PlaybackState::Playing, 0);
        assert_eq!(judge(Acceptance::Skip, &s, &o, Trigger::Playback), Step::Continue);

        let mut o = o;
        o.metadata = Some(MetadataSnapshot::new("b", "b"));
        o.metadata_updates = 1;
        assert!(matches!(judge(Acceptance::Skip, &s, &o, Trigger::Metadata), Step::Pass(_)));
    }

    #[test]
    fn test_skip_same_item_returns_to_start() {
        let s = start(PlaybackState::Paused, 10_000, Some("a"));
        let mut o = observed(&s, PlaybackState::Paused, 10_000);
        o.metadata_updates = 1;
        assert!(matches!(judge(Acceptance::Skip, &s, &o, Trigger::Metadata), Step::Pass(_)));

        o.playback = playback(PlaybackState::Stopped, 0);
        assert!(matches!(judge(Acceptance::Skip, &s, &o, Trigger::Playback), Step::Fail(_)));
    }

    #[test]
    fn test_seek_judging() {
        let s = start(PlaybackState::Playing, 30_000, None);
        let seek = Acceptance::Seek { target_ms: 45_000 };
        assert_eq!(
            judge(seek, &s, &observed(&s, PlaybackState::Playing, 31_000), Trigger::Playback),
            Step::Continue
        );
        assert!(matches!(
            judge(seek, &s, &observed(&s, PlaybackState::Paused, 45_000), Trigger::Playback),
            Step::Pass(_)
        ));
    }

    #[test]
    fn test_seek_ending_in_error_fails() {
        let s = start(PlaybackState::Playing, 30_000, None);
        let seek = Acceptance::Seek { target_ms: 45_000 };
        for position in [45_000, 31_000] {
            assert!(matches!(
                judge(seek, &s, &observed(&s, PlaybackState::Error, position), Trigger::Playback),
                Step::Fail(_)
            ));
        }
    }

    #[test]
    fn test_pause_judging() {
        let playing = start(PlaybackState::Playing, 5_000, Some("a"));
        let step = |s: &StartingState, state| {
            judge(Acceptance::Pause, s, &observed(s, state, 5_000), Trigger::Playback)
        };
        assert!(matches!(step(&playing, PlaybackState::Paused), Step::Pass(_)));
        assert_eq!(step(&playing, PlaybackState::Playing), Step::Continue);
        assert!(matches!(step(&playing, PlaybackState::Error), Step::Fail(_)));
        assert!(matches!(step(&playing, PlaybackState::Stopped), Step::Fail(_)));

        let stopped = start(PlaybackState::Stopped, 0, Some("a"));
        assert!(matches!(step(&stopped, PlaybackState::Playing), Step::Fail(_)));
    }

    #[test]
    fn test_pause_metadata_must_not_change() {
        let s = start(PlaybackState::Playing, 5_000, Some("a"));
        let mut o = Observed::from_start(&s);
        o.metadata = Some(MetadataSnapshot::new("a", "renamed"));
        assert_eq!(judge(Acceptance::Pause, &s, &o, Trigger::Metadata), Step::Continue);
        o.metadata = Some(MetadataSnapshot::new("b", "b"));
        assert!(matches!(
            judge(Acceptance::Pause, &s, &o, Trigger::Metadata),
            Step::Fail(_)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_paused_passes() {
        let (result, log, dispatched) = run(profile(), TransportKind::Play, "").await;
        assert_eq!(result, TestResult::Pass);
        assert_eq!(dispatched, 1);
        assert!(log[0].contains("PASS"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_ending_stopped_fails() {
        let profile = profile().with_reaction(
            "play",
            vec![SessionEvent::Playback(playback(PlaybackState::Stopped, 0))],
        );
        let (result, log, _) = run(profile, TransportKind::Play, "").await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("STATE_STOPPED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresponsive_session_times_out() {
        let profile = profile().with_reaction("play", Vec::new());
        let (result, log, _) = run(profile, TransportKind::Play, "").await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("<Timeout>"));
        assert!(log[0].contains("Operation timed out after 30000ms"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_relative_passes() {
        let profile = profile().with_playback(PlaybackStateSnapshot::new(PlaybackState::Playing, 30_000));
        let (result, log, _) = run(profile, TransportKind::SeekTo, "+15").await;
        assert_eq!(result, TestResult::Pass);
        assert!(log.iter().any(|entry| entry.contains("seek_to(45000ms)")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_unparseable_dispatches_nothing() {
        let (result, log, dispatched) = run(profile(), TransportKind::SeekTo, "abs").await;
        assert_eq!(result, TestResult::Fail);
        assert_eq!(dispatched, 0);
        assert!(log[0].contains("<Invalid query>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_media_id_requires_query() {
        let (result, _, dispatched) = run(profile(), TransportKind::PlayFromMediaId, "  ").await;
        assert_eq!(result, TestResult::Fail);
        assert_eq!(dispatched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_media_id_passes() {
        let (result, _, _) = run(profile(), TransportKind::PlayFromMediaId, "c").await;
        assert_eq!(result, TestResult::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_next_passes() {
        let (result, log, _) = run(profile(), TransportKind::SkipToNext, "").await;
        assert_eq!(result, TestResult::Pass);
        assert!(log.iter().any(|entry| entry.contains("Media id: b")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_queue_item_rejects_non_numeric() {
        let (result, _, dispatched) = run(profile(), TransportKind::SkipToQueueItem, "third").await;
        assert_eq!(result, TestResult::Fail);
        assert_eq!(dispatched, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_without_metadata_update_times_out() {
        let profile = profile().with_reaction(
            "skip_to_next",
            vec![SessionEvent::Playback(playback(PlaybackState::Playing, 0))],
        );
        let (result, _, _) = run(profile, TransportKind::SkipToNext, "").await;
        assert_eq!(result, TestResult::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_clearing_metadata_passes() {
        let profile = profile().with_reaction(
            "stop",
            vec![
                SessionEvent::Metadata(None),
                SessionEvent::Playback(playback(PlaybackState::Stopped, 0)),
            ],
        );
        let (result, _, _) = run(profile, TransportKind::Stop, "").await;
        assert_eq!(result, TestResult::Pass);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_switching_item_fails() {
        let profile = profile().with_reaction(
            "stop",
            vec![
                SessionEvent::Metadata(Some(MetadataSnapshot::new("b", "Song B"))),
                SessionEvent::Playback(playback(PlaybackState::Stopped, 0)),
            ],
        );
        let (result, _, _) = run(profile, TransportKind::Stop, "").await;
        assert_eq!(result, TestResult::Fail);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reaching_stopped_before_item_change_passes() {
        let profile = profile().with_reaction(
            "stop",
            vec![
                SessionEvent::Playback(playback(PlaybackState::Stopped, 0)),
                SessionEvent::Metadata(Some(MetadataSnapshot::new("b", "Song B"))),
            ],
        );
        let (result, log, _) = run(profile, TransportKind::Stop, "").await;
        assert_eq!(result, TestResult::Pass);
        assert!(log[0].contains("PASS: reached STATE_STOPPED"));
        assert!(log[1].contains("<Playback state changed>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_reaching_playing_before_item_change_passes() {
        let profile = profile().with_reaction(
            "play",
            vec![
                SessionEvent::Playback(playback(PlaybackState::Playing, 30_000)),
                SessionEvent::Metadata(Some(MetadataSnapshot::new("b", "Song B"))),
            ],
        );
        let (result, log, _) = run(profile, TransportKind::Play, "").await;
        assert_eq!(result, TestResult::Pass);
        assert!(log[0].contains("PASS: reached STATE_PLAYING"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_switching_item_fails() {
        let profile = profile().with_reaction(
            "pause",
            vec![
                SessionEvent::Metadata(Some(MetadataSnapshot::new("b", "Song B"))),
                SessionEvent::Playback(playback(PlaybackState::Paused, 0)),
            ],
        );
        let (result, log, _) = run(profile, TransportKind::Pause, "").await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("metadata changed from \"a\" to \"b\""));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_ending_playing_or_error_fails() {
        let stopped = profile().with_playback(PlaybackStateSnapshot::new(PlaybackState::Stopped, 0));
        for (base, end) in [(stopped, PlaybackState::Playing), (profile(), PlaybackState::Error)] {
            let base = base.with_reaction("pause", vec![SessionEvent::Playback(playback(end, 0))]);
            let (result, log, _) = run(base, TransportKind::Pause, "").await;
            assert_eq!(result, TestResult::Fail);
            assert!(log[0].contains("expected STATE_PAUSED"));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_uri_requires_query() {
        let (result, log, dispatched) = run(profile(), TransportKind::PlayFromUri, "").await;
        assert_eq!(result, TestResult::Fail);
        assert_eq!(dispatched, 0);
        assert!(log[0].contains("<Invalid query>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_search_passes() {
        let (result, log, dispatched) = run(profile(), TransportKind::PlayFromSearch, "song c").await;
        assert_eq!(result, TestResult::Pass);
        assert_eq!(dispatched, 1);
        assert!(log.iter().any(|entry| entry.contains("Media id: c")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_from_search_resuming_mid_item_fails() {
        let profile = profile().with_reaction(
            "play_from_search",
            vec![SessionEvent::Playback(playback(PlaybackState::Playing, 12_000))],
        );
        let (result, log, _) = run(profile, TransportKind::PlayFromSearch, "song c").await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("expected position 0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_previous_passes() {
        let profile = profile()
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Paused, 30_000).with_active_item(2))
            .with_metadata(MetadataSnapshot::new("b", "Song B"));
        let (result, log, _) = run(profile, TransportKind::SkipToPrevious, "").await;
        assert_eq!(result, TestResult::Pass);
        assert!(log.iter().any(|entry| entry.contains("Media id: a")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_previous_stopping_fails() {
        let profile = profile().with_reaction(
            "skip_to_previous",
            vec![SessionEvent::Playback(playback(PlaybackState::Stopped, 0))],
        );
        let (result, log, _) = run(profile, TransportKind::SkipToPrevious, "").await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("STATE_STOPPED"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_queue_item_passes() {
        let (result, log, _) = run(profile(), TransportKind::SkipToQueueItem, "3").await;
        assert_eq!(result, TestResult::Pass);
        assert!(log.iter().any(|entry| entry.contains("skip_to_queue_item(3)")));
        assert!(log.iter().any(|entry| entry.contains("Media id: c")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skip_to_queue_item_ending_in_error_fails() {
        let profile = profile().with_reaction(
            "skip_to_queue_item",
            vec![
                SessionEvent::Metadata(Some(MetadataSnapshot::new("c", "Song C"))),
                SessionEvent::Playback(playback(PlaybackState::Error, 0)),
            ],
        );
        let (result, log, _) = run(profile, TransportKind::SkipToQueueItem, "3").await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("STATE_ERROR"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_session_is_logged_as_teardown() {
        let (_endpoint, manager, session) = connect(profile()).await;
        manager.disconnect();
        let ctx = EvalContext {
            test_id: 0,
            session,
            query: String::new(),
            log: TestLogger::detached(0),
            timeout: Duration::from_secs(30),
        };
        let result = TransportTest::new(TransportKind::Play).evaluate(&ctx).await;
        assert_eq!(result, TestResult::Fail);
        assert!(ctx.log.entries()[0].contains("<Disconnected>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_mid_test_fails() {
        let profile = profile().with_reaction("pause", Vec::new());
        let (_endpoint, manager, session) = connect(profile).await;
        let ctx = EvalContext {
            test_id: 4,
            session,
            query: String::new(),
            log: TestLogger::detached(4),
            timeout: Duration::from_secs(30),
        };

        let pause = TransportTest::new(TransportKind::Pause);
        let evaluation = pause.evaluate(&ctx);
        let disconnect = async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            manager.disconnect();
        };
        let (result, ()) = tokio::join!(evaluation, disconnect);

        assert_eq!(result, TestResult::Fail);
        assert!(ctx.log.entries()[0].contains("<Cancelled>"));
    }
}
