//! Session data model: playback state, metadata, queue and target identity.

use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known keys in browse-root and playback-state extras.
pub mod extras {
    /// Root hint: content style is supported
    pub const CONTENT_STYLE_SUPPORTED: &str = "android.media.browse.CONTENT_STYLE_SUPPORTED";
    /// Root hint: style for browsable items
    pub const CONTENT_STYLE_BROWSABLE_HINT: &str =
        "android.media.browse.CONTENT_STYLE_BROWSABLE_HINT";
    /// Root hint: style for playable items
    pub const CONTENT_STYLE_PLAYABLE_HINT: &str =
        "android.media.browse.CONTENT_STYLE_PLAYABLE_HINT";
    /// Root hint: search is supported
    pub const SEARCH_SUPPORTED: &str = "android.media.browse.SEARCH_SUPPORTED";
    /// Playback extra: label of the error resolution action
    pub const ERROR_RESOLUTION_ACTION_LABEL: &str =
        "android.media.extras.ERROR_RESOLUTION_ACTION_LABEL";
    /// Playback extra: intent of the error resolution action
    pub const ERROR_RESOLUTION_ACTION_INTENT: &str =
        "android.media.extras.ERROR_RESOLUTION_ACTION_INTENT";
}

// =============================================================================
// PLAYBACK STATE
// =============================================================================

/// Playback state reported by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    /// No state set yet
    #[default]
    None,
    /// Stopped
    Stopped,
    /// Paused
    Paused,
    /// Playing
    Playing,
    /// Fast forwarding
    FastForwarding,
    /// Rewinding
    Rewinding,
    /// Buffering
    Buffering,
    /// Error
    Error,
    /// Connecting to a remote device
    Connecting,
    /// Skipping to the previous item
    SkippingToPrevious,
    /// Skipping to the next item
    SkippingToNext,
    /// Skipping to a queue item
    SkippingToQueueItem,
}

impl PlaybackState {
    /// Get the protocol name for this state
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "STATE_NONE",
            Self::Stopped => "STATE_STOPPED",
            Self::Paused => "STATE_PAUSED",
            Self::Playing => "STATE_PLAYING",
            Self::FastForwarding => "STATE_FAST_FORWARDING",
            Self::Rewinding => "STATE_REWINDING",
            Self::Buffering => "STATE_BUFFERING",
            Self::Error => "STATE_ERROR",
            Self::Connecting => "STATE_CONNECTING",
            Self::SkippingToPrevious => "STATE_SKIPPING_TO_PREVIOUS",
            Self::SkippingToNext => "STATE_SKIPPING_TO_NEXT",
            Self::SkippingToQueueItem => "STATE_SKIPPING_TO_QUEUE_ITEM",
        }
    }

    /// Whether the session is expected to leave this state on its own.
    ///
    /// Terminal states are the ones a transport command can settle in.
    #[must_use]
    pub const fn is_transitional(self) -> bool {
        matches!(
            self,
            Self::FastForwarding
                | Self::Rewinding
                | Self::Buffering
                | Self::Connecting
                | Self::SkippingToPrevious
                | Self::SkippingToNext
                | Self::SkippingToQueueItem
        )
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Custom action icon as declared by the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    /// Vector drawable (scales to any surface)
    Vector,
    /// Bitmap drawable
    Bitmap,
    /// No icon resource
    #[default]
    Missing,
}

/// Custom transport action exposed through the playback state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomAction {
    /// Action identifier
    pub action: String,
    /// Display name
    pub name: String,
    /// Icon kind
    #[serde(default)]
    pub icon: IconKind,
}

impl CustomAction {
    /// Create a new custom action
    #[must_use]
    pub fn new(action: impl Into<String>, name: impl Into<String>, icon: IconKind) -> Self {
        Self {
            action: action.into(),
            name: name.into(),
            icon,
        }
    }
}

/// One playback state update from the session
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlaybackStateSnapshot {
    /// State tag
    pub state: PlaybackState,
    /// Playback position in milliseconds
    #[serde(default)]
    pub position_ms: u64,
    /// Queue id of the active item
    #[serde(default)]
    pub active_queue_item_id: Option<i64>,
    /// Error message (for `STATE_ERROR`)
    #[serde(default)]
    pub error_message: Option<String>,
    /// Extras bundle
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
    /// Custom actions
    #[serde(default)]
    pub custom_actions: Vec<CustomAction>,
}

impl PlaybackStateSnapshot {
    /// Create a snapshot with a state and position
    #[must_use]
    pub fn new(state: PlaybackState, position_ms: u64) -> Self {
        Self {
            state,
            position_ms,
            ..Self::default()
        }
    }

    /// Set the active queue item
    #[must_use]
    pub const fn with_active_item(mut self, queue_id: i64) -> Self {
        self.active_queue_item_id = Some(queue_id);
        self
    }

    /// Set the error message
    #[must_use]
    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Add an extra
    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Add a custom action
    #[must_use]
    pub fn with_custom_action(mut self, action: CustomAction) -> Self {
        self.custom_actions.push(action);
        self
    }

    /// Same snapshot moved to another state and position
    #[must_use]
    pub fn moved_to(&self, state: PlaybackState, position_ms: u64) -> Self {
        Self {
            state,
            position_ms,
            ..self.clone()
        }
    }
}

// =============================================================================
// METADATA & QUEUE
// =============================================================================

/// Description of the current media item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    /// Media id
    pub media_id: String,
    /// Title
    pub title: String,
    /// Subtitle / artist
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Duration in milliseconds
    #[serde(default)]
    pub duration_ms: Option<u64>,
    /// Artwork reference
    #[serde(default)]
    pub artwork_uri: Option<String>,
}

impl MetadataSnapshot {
    /// Create metadata for a media item
    #[must_use]
    pub fn new(media_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: title.into(),
            subtitle: None,
            duration_ms: None,
            artwork_uri: None,
        }
    }

    /// Set duration
    #[must_use]
    pub const fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Set artwork reference
    #[must_use]
    pub fn with_artwork(mut self, uri: impl Into<String>) -> Self {
        self.artwork_uri = Some(uri.into());
        self
    }

    /// Whether both describe the same media item
    #[must_use]
    pub fn same_item(&self, other: &Self) -> bool {
        self.media_id == other.media_id
    }
}

/// Whether two optional metadata values describe the same item (both absent counts)
#[must_use]
pub fn same_item(a: Option<&MetadataSnapshot>, b: Option<&MetadataSnapshot>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.same_item(b),
        _ => false,
    }
}

/// One entry of the play queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Queue id
    pub queue_id: i64,
    /// Media id
    pub media_id: String,
    /// Title
    pub title: String,
    /// Subtitle
    #[serde(default)]
    pub subtitle: Option<String>,
    /// Media URI
    #[serde(default)]
    pub media_uri: Option<String>,
}

impl QueueItem {
    /// Create a queue item
    #[must_use]
    pub fn new(queue_id: i64, media_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            queue_id,
            media_id: media_id.into(),
            title: title.into(),
            subtitle: None,
            media_uri: None,
        }
    }

    /// Set media URI
    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.media_uri = Some(uri.into());
        self
    }

    /// Metadata describing this item
    #[must_use]
    pub fn to_metadata(&self) -> MetadataSnapshot {
        MetadataSnapshot {
            media_id: self.media_id.clone(),
            title: self.title.clone(),
            subtitle: self.subtitle.clone(),
            duration_ms: None,
            artwork_uri: None,
        }
    }
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatMode {
    /// No repeat
    #[default]
    None,
    /// Repeat current item
    One,
    /// Repeat the whole queue
    All,
    /// Repeat current group
    Group,
}

impl RepeatMode {
    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "REPEAT_MODE_NONE",
            Self::One => "REPEAT_MODE_ONE",
            Self::All => "REPEAT_MODE_ALL",
            Self::Group => "REPEAT_MODE_GROUP",
        }
    }
}

/// Shuffle mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShuffleMode {
    /// No shuffle
    #[default]
    None,
    /// Shuffle everything
    All,
    /// Shuffle current group
    Group,
}

impl ShuffleMode {
    /// Display name
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::None => "SHUFFLE_MODE_NONE",
            Self::All => "SHUFFLE_MODE_ALL",
            Self::Group => "SHUFFLE_MODE_GROUP",
        }
    }
}

// =============================================================================
// BROWSE TREE
// =============================================================================

/// Root of the browse tree
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BrowseRoot {
    /// Root media id
    pub root_id: String,
    /// Root hints
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

/// One node of the browse tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseItem {
    /// Media id
    pub media_id: String,
    /// Title
    pub title: String,
    /// Has children
    #[serde(default)]
    pub browsable: bool,
    /// Can be played
    #[serde(default)]
    pub playable: bool,
    /// Artwork reference
    #[serde(default)]
    pub artwork_uri: Option<String>,
}

impl BrowseItem {
    /// Create a browsable node
    #[must_use]
    pub fn browsable(media_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: title.into(),
            browsable: true,
            playable: false,
            artwork_uri: None,
        }
    }

    /// Create a playable leaf
    #[must_use]
    pub fn playable(media_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            media_id: media_id.into(),
            title: title.into(),
            browsable: false,
            playable: true,
            artwork_uri: None,
        }
    }

    /// Set artwork reference
    #[must_use]
    pub fn with_artwork(mut self, uri: impl Into<String>) -> Self {
        self.artwork_uri = Some(uri.into());
        self
    }
}

// =============================================================================
// TRANSPORT COMMANDS & SESSION EVENTS
// =============================================================================

/// Transport control issued against the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCommand {
    /// play()
    Play,
    /// pause()
    Pause,
    /// stop()
    Stop,
    /// skipToNext()
    SkipToNext,
    /// skipToPrevious()
    SkipToPrevious,
    /// skipToQueueItem(id)
    SkipToQueueItem {
        /// Queue id
        queue_id: i64,
    },
    /// seekTo(position)
    SeekTo {
        /// Position in milliseconds
        position_ms: u64,
    },
    /// playFromSearch(query)
    PlayFromSearch {
        /// Search query
        query: String,
    },
    /// playFromMediaId(id)
    PlayFromMediaId {
        /// Media id
        media_id: String,
    },
    /// playFromUri(uri)
    PlayFromUri {
        /// Media URI
        uri: String,
    },
}

impl TransportCommand {
    /// Stable key used in profiles and logs
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Play => "play",
            Self::Pause => "pause",
            Self::Stop => "stop",
            Self::SkipToNext => "skip_to_next",
            Self::SkipToPrevious => "skip_to_previous",
            Self::SkipToQueueItem { .. } => "skip_to_queue_item",
            Self::SeekTo { .. } => "seek_to",
            Self::PlayFromSearch { .. } => "play_from_search",
            Self::PlayFromMediaId { .. } => "play_from_media_id",
            Self::PlayFromUri { .. } => "play_from_uri",
        }
    }
}

impl fmt::Display for TransportCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SkipToQueueItem { queue_id } => write!(f, "skip_to_queue_item({queue_id})"),
            Self::SeekTo { position_ms } => write!(f, "seek_to({position_ms}ms)"),
            Self::PlayFromSearch { query } => write!(f, "play_from_search(\"{query}\")"),
            Self::PlayFromMediaId { media_id } => write!(f, "play_from_media_id(\"{media_id}\")"),
            Self::PlayFromUri { uri } => write!(f, "play_from_uri(\"{uri}\")"),
            other => write!(f, "{}()", other.key()),
        }
    }
}

/// State change pushed by the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// Playback state changed
    Playback(Option<PlaybackStateSnapshot>),
    /// Metadata changed
    Metadata(Option<MetadataSnapshot>),
    /// Repeat mode changed
    RepeatMode(RepeatMode),
    /// Shuffle mode changed
    ShuffleMode(ShuffleMode),
    /// Queue title changed
    QueueTitle(Option<String>),
    /// Queue changed
    Queue(Vec<QueueItem>),
    /// Session went away
    Destroyed,
}

/// Current values of every tracked dimension
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Playback state
    #[serde(default)]
    pub playback: Option<PlaybackStateSnapshot>,
    /// Metadata
    #[serde(default)]
    pub metadata: Option<MetadataSnapshot>,
    /// Repeat mode
    #[serde(default)]
    pub repeat_mode: RepeatMode,
    /// Shuffle mode
    #[serde(default)]
    pub shuffle_mode: ShuffleMode,
    /// Queue title
    #[serde(default)]
    pub queue_title: Option<String>,
    /// Queue
    #[serde(default)]
    pub queue: Vec<QueueItem>,
}

// =============================================================================
// TARGET APPLICATION
// =============================================================================

/// The application under test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetApplication {
    /// Package identity
    pub package: String,
    /// Display name
    #[serde(default)]
    pub app_name: String,
    /// Declares support for the common tier
    #[serde(default)]
    pub supports_common: bool,
    /// Declares support for the extended tier
    #[serde(default)]
    pub supports_extended: bool,
    /// Settings activity, if declared
    #[serde(default)]
    pub preference_activity: Option<String>,
    /// Launcher activity, if declared
    #[serde(default)]
    pub launcher_activity: Option<String>,
}

impl TargetApplication {
    /// Create a target with basic capabilities only
    #[must_use]
    pub fn new(package: impl Into<String>) -> Self {
        let package = package.into();
        Self {
            app_name: package.clone(),
            package,
            supports_common: false,
            supports_extended: false,
            preference_activity: None,
            launcher_activity: None,
        }
    }

    /// Set display name
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    /// Declare common-tier support
    #[must_use]
    pub const fn with_common(mut self) -> Self {
        self.supports_common = true;
        self
    }

    /// Declare extended-tier support
    #[must_use]
    pub const fn with_extended(mut self) -> Self {
        self.supports_extended = true;
        self
    }

    /// Declare a preference activity
    #[must_use]
    pub fn with_preference_activity(mut self, activity: impl Into<String>) -> Self {
        self.preference_activity = Some(activity.into());
        self
    }

    /// Declare a launcher activity
    #[must_use]
    pub fn with_launcher_activity(mut self, activity: impl Into<String>) -> Self {
        self.launcher_activity = Some(activity.into());
        self
    }

    /// Build a target from launch extras.
    ///
    /// Recognized keys: `package` (required), `app_name`, `supports_common`,
    /// `supports_extended` (`true`/`false`), `preference_activity`,
    /// `launcher_activity`.
    pub fn from_launch_extras(extras: &BTreeMap<String, String>) -> ProbeResult<Self> {
        let package = extras
            .get("package")
            .map(|p| p.trim())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProbeError::invalid_argument("launch extras carry no package"))?;

        let flag = |key: &str| -> ProbeResult<bool> {
            match extras.get(key).map(String::as_str) {
                None => Ok(false),
                Some(value) => value.parse().map_err(|_| {
                    ProbeError::invalid_argument(format!("{key} must be true or false, got {value:?}"))
                }),
            }
        };

        let mut target = Self::new(package);
        if let Some(name) = extras.get("app_name") {
            target.app_name = name.clone();
        }
        target.supports_common = flag("supports_common")?;
        target.supports_extended = flag("supports_extended")?;
        target.preference_activity = extras.get("preference_activity").cloned();
        target.launcher_activity = extras.get("launcher_activity").cloned();
        Ok(target)
    }
}
