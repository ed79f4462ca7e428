//! Capability tests: static inspection of the browse tree, root hints,
//! playback extras and declared activities.

use super::{bounded, log_error, EvalContext, Evaluator, TestResult};
use crate::model::{extras, BrowseItem, IconKind, PlaybackState};
use crate::result::ProbeResult;
use crate::session::MediaBrowser;
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};

/// Deepest level below the root a browse tree may reach
pub const MAX_BROWSE_DEPTH: usize = 3;

/// Most children the browse root may have
pub const MAX_ROOT_CHILDREN: usize = 4;

/// Upper bound on nodes visited when walking a browse tree
const MAX_VISITED_NODES: usize = 2_000;

/// Deepest level the artwork walk descends to
const ARTWORK_WALK_DEPTH: usize = 8;

const ARTWORK_SCHEMES: [&str; 2] = ["content://", "android.resource://"];

/// What a capability test inspects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityCheck {
    /// Browse tree has content and is at most three levels deep
    BrowseTreeDepth,
    /// Every browse item carries artwork by content reference
    MediaArtwork,
    /// Root hints declare content styles
    ContentStyle,
    /// Custom action icons are vector drawables
    CustomActionIconType,
    /// Root hints declare search support
    SearchSupported,
    /// Session did not start out playing
    InitialPlaybackState,
    /// Root has one to four browsable children
    BrowseTreeStructure,
    /// A settings activity is declared
    PreferenceActivity,
    /// Error states carry resolution data
    ErrorResolutionData,
    /// A launcher activity is declared
    LauncherIntent,
}

/// A test that inspects static session data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapabilityTest {
    check: CapabilityCheck,
}

impl CapabilityTest {
    /// Create a test for a check
    #[must_use]
    pub const fn new(check: CapabilityCheck) -> Self {
        Self { check }
    }

    /// Check performed
    #[must_use]
    pub const fn check(&self) -> CapabilityCheck {
        self.check
    }
}

#[async_trait]
impl Evaluator for CapabilityTest {
    async fn evaluate(&self, ctx: &EvalContext) -> TestResult {
        let check = self.check;
        bounded(ctx, async move {
            let outcome = match check {
                CapabilityCheck::BrowseTreeDepth => browse_tree_depth(ctx).await,
                CapabilityCheck::MediaArtwork => media_artwork(ctx).await,
                CapabilityCheck::ContentStyle => content_style(ctx),
                CapabilityCheck::CustomActionIconType => custom_action_icons(ctx),
                CapabilityCheck::SearchSupported => search_supported(ctx),
                CapabilityCheck::InitialPlaybackState => initial_playback_state(ctx),
                CapabilityCheck::BrowseTreeStructure => browse_tree_structure(ctx).await,
                CapabilityCheck::PreferenceActivity => Ok(preference_activity(ctx)),
                CapabilityCheck::ErrorResolutionData => error_resolution_data(ctx),
                CapabilityCheck::LauncherIntent => Ok(launcher_intent(ctx)),
            };
            let result = outcome.unwrap_or_else(|err| {
                log_error(&ctx.log, &err);
                TestResult::Fail
            });
            tracing::info!(test_id = ctx.test_id, ?check, %result, "capability check finished");
            result
        })
        .await
    }
}

struct Visit {
    item: BrowseItem,
    depth: usize,
}

/// Breadth-first walk from the root. Items at `max_depth` are listed but not expanded.
async fn walk(browser: &dyn MediaBrowser, max_depth: usize) -> ProbeResult<Vec<Visit>> {
    let root = browser.root();
    let mut visited = HashSet::from([root.root_id.clone()]);
    let mut pending = VecDeque::from([(root.root_id, 0_usize)]);
    let mut visits = Vec::new();

    while let Some((parent, depth)) = pending.pop_front() {
        for item in browser.children(&parent).await? {
            let child_depth = depth + 1;
            if item.browsable && child_depth < max_depth && visited.insert(item.media_id.clone()) {
                pending.push_back((item.media_id.clone(), child_depth));
            }
            visits.push(Visit {
                item,
                depth: child_depth,
            });
            if visits.len() >= MAX_VISITED_NODES {
                tracing::warn!(limit = MAX_VISITED_NODES, "browse walk truncated");
                return Ok(visits);
            }
        }
    }
    Ok(visits)
}

async fn browse_tree_depth(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let browser = ctx.session.browser()?;
    let visits = walk(browser.as_ref(), MAX_BROWSE_DEPTH + 1).await?;

    if visits.is_empty() {
        ctx.log.log("Browse tree", "Root has no children");
        return Ok(TestResult::Fail);
    }
    let deepest = visits.iter().map(|v| v.depth).max().unwrap_or(0);
    if let Some(too_deep) = visits.iter().find(|v| v.depth > MAX_BROWSE_DEPTH) {
        ctx.log.log(
            "Browse tree",
            format!(
                "{:?} sits {} levels below the root (limit {MAX_BROWSE_DEPTH})",
                too_deep.item.media_id, too_deep.depth
            ),
        );
        return Ok(TestResult::Fail);
    }
    ctx.log.log(
        "Browse tree",
        format!("{} items, deepest at level {deepest}", visits.len()),
    );
    Ok(TestResult::Pass)
}

async fn media_artwork(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let browser = ctx.session.browser()?;
    let visits = walk(browser.as_ref(), ARTWORK_WALK_DEPTH).await?;

    if visits.is_empty() {
        ctx.log.log("Artwork", "Browse tree is empty");
        return Ok(TestResult::Fail);
    }

    let offending: Vec<&BrowseItem> = visits
        .iter()
        .map(|v| &v.item)
        .filter(|item| {
            !item
                .artwork_uri
                .as_deref()
                .is_some_and(|uri| ARTWORK_SCHEMES.iter().any(|scheme| uri.starts_with(scheme)))
        })
        .collect();

    if offending.is_empty() {
        ctx.log.log("Artwork", format!("All {} items carry artwork", visits.len()));
        return Ok(TestResult::Pass);
    }
    for item in &offending {
        ctx.log.log(
            "Artwork",
            format!(
                "{:?} has artwork {}",
                item.media_id,
                item.artwork_uri.as_deref().unwrap_or("(none)")
            ),
        );
    }
    ctx.log.log(
        "Artwork",
        format!(
            "{} of {} items lack a content:// or android.resource:// artwork reference",
            offending.len(),
            visits.len()
        ),
    );
    Ok(TestResult::Fail)
}

fn content_style(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let root = ctx.session.browser()?.root();
    let declared: Vec<&str> = [
        extras::CONTENT_STYLE_SUPPORTED,
        extras::CONTENT_STYLE_BROWSABLE_HINT,
        extras::CONTENT_STYLE_PLAYABLE_HINT,
    ]
    .into_iter()
    .filter(|key| root.extras.contains_key(*key))
    .collect();

    if declared.is_empty() {
        ctx.log.log("Content style", "Root hints declare no content style");
        Ok(TestResult::OptionalFail)
    } else {
        ctx.log.log("Content style", format!("Declared: {}", declared.join(", ")));
        Ok(TestResult::Pass)
    }
}

fn search_supported(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let root = ctx.session.browser()?.root();
    if root.extras.get(extras::SEARCH_SUPPORTED).map(String::as_str) == Some("true") {
        ctx.log.log("Search", "Root hints declare search support");
        Ok(TestResult::Pass)
    } else {
        ctx.log.log("Search", "Root hints do not declare search support");
        Ok(TestResult::OptionalFail)
    }
}

fn custom_action_icons(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let actions = ctx
        .session
        .playback_state()?
        .map(|p| p.custom_actions)
        .unwrap_or_default();

    if actions.is_empty() {
        ctx.log.log("Custom actions", "No custom actions to check");
        return Ok(TestResult::Pass);
    }

    let mut result = TestResult::Pass;
    for action in &actions {
        let verdict = match action.icon {
            IconKind::Vector => "vector",
            IconKind::Bitmap => "bitmap",
            IconKind::Missing => "missing",
        };
        ctx.log.log("Custom actions", format!("{}: {verdict} icon", action.name));
        if action.icon != IconKind::Vector {
            result = TestResult::Fail;
        }
    }
    Ok(result)
}

fn initial_playback_state(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let initial = ctx.session.initial_playback_state()?;
    let state = initial.as_ref().map(|p| p.state);
    let acceptable = matches!(
        state,
        None | Some(PlaybackState::None | PlaybackState::Stopped | PlaybackState::Paused)
    );
    let described = state.map_or("absent", PlaybackState::name);
    if acceptable {
        ctx.log.log("Initial state", format!("Session started in {described}"));
        Ok(TestResult::Pass)
    } else {
        ctx.log.log(
            "Initial state",
            format!("Session started in {described}, expected absent, STATE_NONE, STATE_STOPPED or STATE_PAUSED"),
        );
        Ok(TestResult::Fail)
    }
}

async fn browse_tree_structure(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let browser = ctx.session.browser()?;
    let root = browser.root();
    let children = browser.children(&root.root_id).await?;

    if children.is_empty() || children.len() > MAX_ROOT_CHILDREN {
        ctx.log.log(
            "Browse structure",
            format!(
                "Root has {} children, expected 1 to {MAX_ROOT_CHILDREN}",
                children.len()
            ),
        );
        return Ok(TestResult::Fail);
    }
    let leaves: Vec<&str> = children
        .iter()
        .filter(|c| !c.browsable)
        .map(|c| c.media_id.as_str())
        .collect();
    if !leaves.is_empty() {
        ctx.log.log(
            "Browse structure",
            format!("Root children that are not browsable: {}", leaves.join(", ")),
        );
        return Ok(TestResult::Fail);
    }
    ctx.log.log(
        "Browse structure",
        format!("Root has {} browsable children", children.len()),
    );
    Ok(TestResult::Pass)
}

fn preference_activity(ctx: &EvalContext) -> TestResult {
    match &ctx.session.target().preference_activity {
        Some(activity) => {
            ctx.log.log("Preferences", format!("Declared: {activity}"));
            TestResult::Pass
        }
        None => {
            ctx.log.log("Preferences", "No preference activity declared");
            TestResult::OptionalFail
        }
    }
}

fn launcher_intent(ctx: &EvalContext) -> TestResult {
    match &ctx.session.target().launcher_activity {
        Some(activity) => {
            ctx.log.log("Launcher", format!("Declared: {activity}"));
            TestResult::Pass
        }
        None => {
            ctx.log.log("Launcher", "No launcher activity declared");
            TestResult::Fail
        }
    }
}

fn error_resolution_data(ctx: &EvalContext) -> ProbeResult<TestResult> {
    let Some(state) = ctx
        .session
        .playback_state()?
        .filter(|p| p.state == PlaybackState::Error)
    else {
        ctx.log.log(
            "Error resolution",
            "Session is not in STATE_ERROR, resolution data cannot be verified",
        );
        return Ok(TestResult::OptionalFail);
    };

    let mut missing = Vec::new();
    if state.error_message.as_deref().map_or(true, str::is_empty) {
        missing.push("error message");
    }
    if !state.extras.contains_key(extras::ERROR_RESOLUTION_ACTION_LABEL) {
        missing.push("resolution action label");
    }
    if !state.extras.contains_key(extras::ERROR_RESOLUTION_ACTION_INTENT) {
        missing.push("resolution action intent");
    }

    if missing.is_empty() {
        ctx.log.log("Error resolution", "Error state carries message, label and intent");
        Ok(TestResult::Pass)
    } else {
        ctx.log.log("Error resolution", format!("Missing: {}", missing.join(", ")));
        Ok(TestResult::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::TestLogger;
    use crate::model::{
        BrowseItem, CustomAction, PlaybackStateSnapshot, TargetApplication,
    };
    use crate::sim::testing::connect;
    use crate::sim::TargetProfile;
    use std::time::Duration;

    async fn check(profile: TargetProfile, check: CapabilityCheck) -> (TestResult, Vec<String>) {
        let (_endpoint, _manager, session) = connect(profile).await;
        let ctx = EvalContext {
            test_id: 10,
            session,
            query: String::new(),
            log: TestLogger::detached(10),
            timeout: Duration::from_secs(30),
        };
        let result = CapabilityTest::new(check).evaluate(&ctx).await;
        (result, ctx.log.entries())
    }

    fn target() -> TargetApplication {
        TargetApplication::new("com.example.player").with_extended()
    }

    fn art(item: BrowseItem) -> BrowseItem {
        let uri = format!("content://com.example.player/art/{}", item.media_id);
        item.with_artwork(uri)
    }

    fn tree(depth: usize) -> TargetProfile {
        let mut profile = TargetProfile::new(target());
        let mut parent = "root".to_string();
        for level in 1..=depth {
            let id = format!("level-{level}");
            let item = if level == depth {
                BrowseItem::playable(&id, &id)
            } else {
                BrowseItem::browsable(&id, &id)
            };
            profile = profile.with_children(&parent, vec![art(item)]);
            parent = id;
        }
        profile
    }

    #[tokio::test]
    async fn test_depth_within_limit_passes() {
        assert_eq!(check(tree(3), CapabilityCheck::BrowseTreeDepth).await.0, TestResult::Pass);
    }

    #[tokio::test]
    async fn test_depth_over_limit_fails() {
        assert_eq!(check(tree(4), CapabilityCheck::BrowseTreeDepth).await.0, TestResult::Fail);
    }

    #[tokio::test]
    async fn test_empty_tree_fails_depth() {
        let profile = TargetProfile::new(target()).with_children("root", Vec::new());
        assert_eq!(check(profile, CapabilityCheck::BrowseTreeDepth).await.0, TestResult::Fail);
    }

    #[tokio::test]
    async fn test_cyclic_tree_terminates() {
        let profile = TargetProfile::new(target())
            .with_children("root", vec![art(BrowseItem::browsable("loop", "Loop"))])
            .with_children("loop", vec![art(BrowseItem::browsable("root", "Back"))]);
        assert_eq!(check(profile, CapabilityCheck::BrowseTreeDepth).await.0, TestResult::Pass);
    }

    #[tokio::test]
    async fn test_no_browse_service_fails() {
        let profile = TargetProfile::new(target());
        let (result, log) = check(profile, CapabilityCheck::BrowseTreeDepth).await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("no browse service"));
    }

    #[tokio::test]
    async fn test_artwork_schemes() {
        assert_eq!(check(tree(2), CapabilityCheck::MediaArtwork).await.0, TestResult::Pass);

        let profile = TargetProfile::new(target()).with_children(
            "root",
            vec![
                art(BrowseItem::playable("a", "A")),
                BrowseItem::playable("b", "B").with_artwork("https://cdn.example.com/b.png"),
                BrowseItem::playable("c", "C"),
            ],
        );
        let (result, log) = check(profile, CapabilityCheck::MediaArtwork).await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("2 of 3"));
    }

    #[tokio::test]
    async fn test_root_hints() {
        let bare = tree(1);
        assert_eq!(
            check(bare.clone(), CapabilityCheck::ContentStyle).await.0,
            TestResult::OptionalFail
        );
        assert_eq!(
            check(bare, CapabilityCheck::SearchSupported).await.0,
            TestResult::OptionalFail
        );

        let hinted = tree(1)
            .with_root_extra(extras::CONTENT_STYLE_BROWSABLE_HINT, "1")
            .with_root_extra(extras::SEARCH_SUPPORTED, "true");
        assert_eq!(check(hinted.clone(), CapabilityCheck::ContentStyle).await.0, TestResult::Pass);
        assert_eq!(check(hinted, CapabilityCheck::SearchSupported).await.0, TestResult::Pass);
    }

    #[tokio::test]
    async fn test_custom_action_icons() {
        let none = TargetProfile::new(target())
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Paused, 0));
        assert_eq!(check(none, CapabilityCheck::CustomActionIconType).await.0, TestResult::Pass);

        let mixed = TargetProfile::new(target()).with_playback(
            PlaybackStateSnapshot::new(PlaybackState::Paused, 0)
                .with_custom_action(CustomAction::new("like", "Like", IconKind::Vector))
                .with_custom_action(CustomAction::new("radio", "Radio", IconKind::Bitmap)),
        );
        assert_eq!(check(mixed, CapabilityCheck::CustomActionIconType).await.0, TestResult::Fail);
    }

    #[tokio::test]
    async fn test_initial_state() {
        let absent = TargetProfile::new(target());
        assert_eq!(check(absent, CapabilityCheck::InitialPlaybackState).await.0, TestResult::Pass);

        let playing = TargetProfile::new(target())
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Playing, 0));
        assert_eq!(check(playing, CapabilityCheck::InitialPlaybackState).await.0, TestResult::Fail);
    }

    #[tokio::test]
    async fn test_structure() {
        let good = TargetProfile::new(target()).with_children(
            "root",
            vec![BrowseItem::browsable("music", "Music"), BrowseItem::browsable("podcasts", "Podcasts")],
        );
        assert_eq!(check(good, CapabilityCheck::BrowseTreeStructure).await.0, TestResult::Pass);

        let crowded = TargetProfile::new(target()).with_children(
            "root",
            (0..5).map(|i| BrowseItem::browsable(format!("tab-{i}"), "Tab")).collect(),
        );
        assert_eq!(check(crowded, CapabilityCheck::BrowseTreeStructure).await.0, TestResult::Fail);

        let leaf = TargetProfile::new(target())
            .with_children("root", vec![BrowseItem::playable("song", "Song")]);
        assert_eq!(check(leaf, CapabilityCheck::BrowseTreeStructure).await.0, TestResult::Fail);
    }

    #[tokio::test]
    async fn test_declared_activities() {
        let bare = TargetProfile::new(target());
        assert_eq!(
            check(bare.clone(), CapabilityCheck::PreferenceActivity).await.0,
            TestResult::OptionalFail
        );
        assert_eq!(check(bare, CapabilityCheck::LauncherIntent).await.0, TestResult::Fail);

        let declared = TargetProfile::new(
            target()
                .with_preference_activity(".SettingsActivity")
                .with_launcher_activity(".MainActivity"),
        );
        assert_eq!(
            check(declared.clone(), CapabilityCheck::PreferenceActivity).await.0,
            TestResult::Pass
        );
        assert_eq!(check(declared, CapabilityCheck::LauncherIntent).await.0, TestResult::Pass);
    }

    #[tokio::test]
    async fn test_error_resolution() {
        let idle = TargetProfile::new(target())
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Paused, 0));
        assert_eq!(
            check(idle, CapabilityCheck::ErrorResolutionData).await.0,
            TestResult::OptionalFail
        );

        let bare_error = TargetProfile::new(target()).with_playback(
            PlaybackStateSnapshot::new(PlaybackState::Error, 0).with_error("Sign in required"),
        );
        let (result, log) = check(bare_error, CapabilityCheck::ErrorResolutionData).await;
        assert_eq!(result, TestResult::Fail);
        assert!(log[0].contains("resolution action label"));

        let complete = TargetProfile::new(target()).with_playback(
            PlaybackStateSnapshot::new(PlaybackState::Error, 0)
                .with_error("Sign in required")
                .with_extra(extras::ERROR_RESOLUTION_ACTION_LABEL, "Sign in")
                .with_extra(extras::ERROR_RESOLUTION_ACTION_INTENT, "intent:#Intent;action=SIGN_IN;end"),
        );
        assert_eq!(check(complete, CapabilityCheck::ErrorResolutionData).await.0, TestResult::Pass);
    }
}
