//! Test catalog.
//!
//! Ids are stable: evaluators, hosts and run logs key on them, never on
//! list position. Tier membership depends only on what the target declares.

use crate::config::GATED_PLATFORM_LEVEL;
use crate::evaluator::{
    CapabilityCheck, CapabilityTest, Evaluator, TestResult, TransportKind, TransportTest,
};
use crate::model::TargetApplication;
use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Stable numeric test identifier
pub type TestId = u32;

/// Capability tier a test belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    /// Transport controls every target must handle
    Basic,
    /// Checks for targets declaring common support
    Common,
    /// Checks for targets declaring extended support
    Extended,
}

impl Tier {
    /// Whether a target's declarations enable this tier
    #[must_use]
    pub const fn enabled_for(self, target: &TargetApplication) -> bool {
        match self {
            Self::Basic => true,
            Self::Common => target.supports_common || target.supports_extended,
            Self::Extended => target.supports_extended,
        }
    }

    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Common => "common",
            Self::Extended => "extended",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Every test the engine knows, in id order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum TestKind {
    Play,
    PlayFromSearch,
    PlayFromMediaId,
    PlayFromUri,
    Pause,
    Stop,
    SkipToNext,
    SkipToPrevious,
    SkipToQueueItem,
    SeekTo,
    BrowseTreeDepth,
    MediaArtwork,
    ContentStyle,
    CustomActionIconType,
    SearchSupported,
    InitialPlaybackState,
    BrowseTreeStructure,
    PreferenceActivity,
    ErrorResolutionData,
    LauncherIntent,
}

impl TestKind {
    /// All kinds in id order
    pub const ALL: [Self; 20] = [
        Self::Play,
        Self::PlayFromSearch,
        Self::PlayFromMediaId,
        Self::PlayFromUri,
        Self::Pause,
        Self::Stop,
        Self::SkipToNext,
        Self::SkipToPrevious,
        Self::SkipToQueueItem,
        Self::SeekTo,
        Self::BrowseTreeDepth,
        Self::MediaArtwork,
        Self::ContentStyle,
        Self::CustomActionIconType,
        Self::SearchSupported,
        Self::InitialPlaybackState,
        Self::BrowseTreeStructure,
        Self::PreferenceActivity,
        Self::ErrorResolutionData,
        Self::LauncherIntent,
    ];

    /// Stable id
    #[must_use]
    pub const fn id(self) -> TestId {
        self as TestId
    }

    /// Kind for an id
    #[must_use]
    pub fn from_id(id: TestId) -> Option<Self> {
        Self::ALL.get(usize::try_from(id).ok()?).copied()
    }

    /// Tier
    #[must_use]
    pub const fn tier(self) -> Tier {
        match self.id() {
            0..=9 => Tier::Basic,
            10..=15 => Tier::Common,
            _ => Tier::Extended,
        }
    }

    /// Whether the test reads a free-text query
    #[must_use]
    pub const fn accepts_query(self) -> bool {
        matches!(
            self,
            Self::PlayFromSearch
                | Self::PlayFromMediaId
                | Self::PlayFromUri
                | Self::SkipToQueueItem
                | Self::SeekTo
        )
    }

    /// Lowest platform level the test can run on
    #[must_use]
    pub const fn min_platform_level(self) -> Option<u32> {
        match self {
            Self::BrowseTreeDepth | Self::MediaArtwork | Self::BrowseTreeStructure => {
                Some(GATED_PLATFORM_LEVEL)
            }
            _ => None,
        }
    }

    /// Key of the display text for this test
    #[must_use]
    pub const fn text_key(self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::PlayFromSearch => "play_search",
            Self::PlayFromMediaId => "play_media_id",
            Self::PlayFromUri => "play_uri",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::SkipToNext => "skip_next",
            Self::SkipToPrevious => "skip_prev",
            Self::SkipToQueueItem => "skip_item",
            Self::SeekTo => "seek",
            Self::BrowseTreeDepth => "browse_tree_depth",
            Self::MediaArtwork => "media_artwork",
            Self::ContentStyle => "content_style",
            Self::CustomActionIconType => "custom_actions_icon",
            Self::SearchSupported => "search_supported",
            Self::InitialPlaybackState => "playback_state",
            Self::BrowseTreeStructure => "browse_tree_structure",
            Self::PreferenceActivity => "preference_activity",
            Self::ErrorResolutionData => "error_resolution",
            Self::LauncherIntent => "launcher_intent",
        }
    }

    /// Evaluation procedure
    #[must_use]
    pub fn evaluator(self) -> Arc<dyn Evaluator> {
        let transport = |kind| Arc::new(TransportTest::new(kind)) as Arc<dyn Evaluator>;
        let capability = |check| Arc::new(CapabilityTest::new(check)) as Arc<dyn Evaluator>;
        match self {
            Self::Play => transport(TransportKind::Play),
            Self::PlayFromSearch => transport(TransportKind::PlayFromSearch),
            Self::PlayFromMediaId => transport(TransportKind::PlayFromMediaId),
            Self::PlayFromUri => transport(TransportKind::PlayFromUri),
            Self::Pause => transport(TransportKind::Pause),
            Self::Stop => transport(TransportKind::Stop),
            Self::SkipToNext => transport(TransportKind::SkipToNext),
            Self::SkipToPrevious => transport(TransportKind::SkipToPrevious),
            Self::SkipToQueueItem => transport(TransportKind::SkipToQueueItem),
            Self::SeekTo => transport(TransportKind::SeekTo),
            Self::BrowseTreeDepth => capability(CapabilityCheck::BrowseTreeDepth),
            Self::MediaArtwork => capability(CapabilityCheck::MediaArtwork),
            Self::ContentStyle => capability(CapabilityCheck::ContentStyle),
            Self::CustomActionIconType => capability(CapabilityCheck::CustomActionIconType),
            Self::SearchSupported => capability(CapabilityCheck::SearchSupported),
            Self::InitialPlaybackState => capability(CapabilityCheck::InitialPlaybackState),
            Self::BrowseTreeStructure => capability(CapabilityCheck::BrowseTreeStructure),
            Self::PreferenceActivity => capability(CapabilityCheck::PreferenceActivity),
            Self::ErrorResolutionData => capability(CapabilityCheck::ErrorResolutionData),
            Self::LauncherIntent => capability(CapabilityCheck::LauncherIntent),
        }
    }
}

/// One runnable test and its latest verdict
#[derive(Debug, Clone, Serialize)]
pub struct TestDefinition {
    /// Stable id
    pub id: TestId,
    /// What the test exercises
    pub kind: TestKind,
    /// Display name
    pub name: String,
    /// Description
    pub description: String,
    /// Reads a free-text query
    pub accepts_query: bool,
    /// Tier
    pub tier: Tier,
    /// Lowest platform level the test can run on
    pub min_platform_level: Option<u32>,
    /// Latest verdict
    pub result: TestResult,
    #[serde(skip)]
    evaluator: Arc<dyn Evaluator>,
}

impl TestDefinition {
    /// Definition for a kind, with texts from `text`
    #[must_use]
    pub fn new(kind: TestKind, text: &dyn DisplayText) -> Self {
        let key = kind.text_key();
        Self {
            id: kind.id(),
            kind,
            name: text.display_text_for(&format!("{key}_test_title")),
            description: text.display_text_for(&format!("{key}_test_desc")),
            accepts_query: kind.accepts_query(),
            tier: kind.tier(),
            min_platform_level: kind.min_platform_level(),
            result: TestResult::None,
            evaluator: kind.evaluator(),
        }
    }

    /// Evaluation procedure
    #[must_use]
    pub fn evaluator(&self) -> Arc<dyn Evaluator> {
        Arc::clone(&self.evaluator)
    }

    /// Fail with [`ProbeError::UnsupportedPlatform`] below the minimum level
    pub fn check_platform(&self, platform_level: u32) -> ProbeResult<()> {
        match self.min_platform_level {
            Some(required) if platform_level < required => Err(ProbeError::UnsupportedPlatform {
                test_id: self.id,
                required,
                actual: platform_level,
            }),
            _ => Ok(()),
        }
    }
}

/// Source of user-visible strings
pub trait DisplayText: Send + Sync {
    /// Text for a key; unknown keys come back unchanged
    fn display_text_for(&self, key: &str) -> String;
}

/// Built-in English texts
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticDisplayText;

impl StaticDisplayText {
    fn lookup(key: &str) -> Option<&'static str> {
        Some(match key {
            "play_test_title" => "Play",
            "play_test_desc" => "Sends play and expects STATE_PLAYING on the current item.",
            "play_search_test_title" => "Play from search",
            "play_search_test_desc" => {
                "Sends playFromSearch with the query and expects STATE_PLAYING from position 0. An empty query asks for any music."
            }
            "play_media_id_test_title" => "Play from media id",
            "play_media_id_test_desc" => {
                "Sends playFromMediaId with the query and expects STATE_PLAYING from position 0."
            }
            "play_uri_test_title" => "Play from URI",
            "play_uri_test_desc" => {
                "Sends playFromUri with the query and expects STATE_PLAYING from position 0."
            }
            "pause_test_title" => "Pause",
            "pause_test_desc" => "Sends pause and expects STATE_PAUSED on the current item.",
            "stop_test_title" => "Stop",
            "stop_test_desc" => {
                "Sends stop and expects STATE_STOPPED or STATE_NONE. Metadata may only be cleared."
            }
            "skip_next_test_title" => "Skip to next",
            "skip_next_test_desc" => {
                "Sends skipToNext and expects new metadata playing from position 0, or the same state when there is no next item."
            }
            "skip_prev_test_title" => "Skip to previous",
            "skip_prev_test_desc" => {
                "Sends skipToPrevious and expects new metadata playing from position 0, or the same state when there is no previous item."
            }
            "skip_item_test_title" => "Skip to queue item",
            "skip_item_test_desc" => {
                "Sends skipToQueueItem with the queue id in the query and expects that item playing from position 0."
            }
            "seek_test_title" => "Seek to",
            "seek_test_desc" => {
                "Sends seekTo. The query is seconds from the start, or +/- seconds from the current position."
            }
            "browse_tree_depth_test_title" => "Browse tree depth",
            "browse_tree_depth_test_desc" => {
                "Checks that the browse tree has content and is no more than three levels deep."
            }
            "media_artwork_test_title" => "Media artwork",
            "media_artwork_test_desc" => {
                "Checks that every browse item carries artwork through a content:// or android.resource:// reference."
            }
            "content_style_test_title" => "Content style",
            "content_style_test_desc" => "Checks that the browse root declares content style hints.",
            "custom_actions_icon_test_title" => "Custom action icons",
            "custom_actions_icon_test_desc" => {
                "Checks that every custom action uses a vector drawable icon."
            }
            "search_supported_test_title" => "Search supported",
            "search_supported_test_desc" => "Checks that the browse root declares search support.",
            "playback_state_test_title" => "Initial playback state",
            "playback_state_test_desc" => {
                "Checks that the session was not playing or buffering when the connection was made."
            }
            "browse_tree_structure_test_title" => "Browse tree structure",
            "browse_tree_structure_test_desc" => {
                "Checks that the browse root has between one and four children, all browsable."
            }
            "preference_activity_test_title" => "Preference activity",
            "preference_activity_test_desc" => "Checks that the app declares a settings activity.",
            "error_resolution_test_title" => "Error resolution",
            "error_resolution_test_desc" => {
                "When the session is in STATE_ERROR, checks for an error message and a resolution action."
            }
            "launcher_intent_test_title" => "Launcher intent",
            "launcher_intent_test_desc" => "Checks that the app declares a launcher activity.",
            "test_error_minsdk" => "This test is not supported on this platform level.",
            _ => return None,
        })
    }
}

impl DisplayText for StaticDisplayText {
    fn display_text_for(&self, key: &str) -> String {
        Self::lookup(key).unwrap_or(key).to_string()
    }
}

/// Build the catalog for a target: basic always, common when the target
/// declares common or extended support, extended when it declares extended.
#[must_use]
pub fn build_tests(target: &TargetApplication, text: &dyn DisplayText) -> Vec<TestDefinition> {
    TestKind::ALL
        .into_iter()
        .filter(|kind| kind.tier().enabled_for(target))
        .map(|kind| TestDefinition::new(kind, text))
        .collect()
}
