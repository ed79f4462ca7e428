//! In-process simulated media session.
//!
//! A [`TargetProfile`] describes a target application, its session state,
//! its browse tree and, optionally, how it reacts to individual transport
//! commands. [`SimulatedEndpoint`] turns a profile into a connectable
//! session. Commands without a scripted reaction get the reaction of a
//! well-behaved player.
//!
//! ```yaml
//! target:
//!   package: com.example.player
//!   supports_common: true
//! state:
//!   playback: { state: paused, position_ms: 30000, active_queue_item_id: 1 }
//!   metadata: { media_id: a, title: Song A }
//!   queue:
//!     - { queue_id: 1, media_id: a, title: Song A }
//!     - { queue_id: 2, media_id: b, title: Song B }
//! browse:
//!   root_id: root
//!   extras: { android.media.browse.SEARCH_SUPPORTED: "true" }
//!   children:
//!     root: [{ media_id: music, title: Music, browsable: true }]
//! reactions:
//!   stop: [{ playback: { state: error } }]
//! ```

use crate::lock_unpoisoned;
use crate::model::{
    BrowseItem, BrowseRoot, MetadataSnapshot, PlaybackState, PlaybackStateSnapshot, QueueItem,
    SessionEvent, SessionSnapshot, TargetApplication, TransportCommand,
};
use crate::result::{ProbeError, ProbeResult};
use crate::session::{MediaBrowser, MediaController, SessionEndpoint, SessionLink};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

fn default_root_id() -> String {
    "root".to_string()
}

/// Browse tree of a simulated target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrowseProfile {
    /// Root media id
    #[serde(default = "default_root_id")]
    pub root_id: String,
    /// Root hints
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
    /// Children keyed by parent media id
    #[serde(default)]
    pub children: BTreeMap<String, Vec<BrowseItem>>,
}

impl Default for BrowseProfile {
    fn default() -> Self {
        Self {
            root_id: default_root_id(),
            extras: BTreeMap::new(),
            children: BTreeMap::new(),
        }
    }
}

/// Everything the simulated session knows about a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetProfile {
    /// Application under test
    pub target: TargetApplication,
    /// Reject every connection attempt
    #[serde(default)]
    pub refuse_connection: bool,
    /// Session state at connection time
    #[serde(default)]
    pub state: SessionSnapshot,
    /// Browse tree; absent means no browse service
    #[serde(default)]
    pub browse: Option<BrowseProfile>,
    /// Scripted reactions keyed by command (`play`, `seek_to`, ...)
    #[serde(default, with = "serde_yaml_ng::with::singleton_map_recursive")]
    pub reactions: BTreeMap<String, Vec<SessionEvent>>,
}

impl TargetProfile {
    /// Profile with an empty session
    #[must_use]
    pub fn new(target: TargetApplication) -> Self {
        Self {
            target,
            refuse_connection: false,
            state: SessionSnapshot::default(),
            browse: None,
            reactions: BTreeMap::new(),
        }
    }

    /// Load from YAML text
    pub fn from_yaml(yaml: &str) -> ProbeResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ProbeResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Set the playback state
    #[must_use]
    pub fn with_playback(mut self, playback: PlaybackStateSnapshot) -> Self {
        self.state.playback = Some(playback);
        self
    }

    /// Set the metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: MetadataSnapshot) -> Self {
        self.state.metadata = Some(metadata);
        self
    }

    /// Set the queue
    #[must_use]
    pub fn with_queue(mut self, queue: Vec<QueueItem>) -> Self {
        self.state.queue = queue;
        self
    }

    /// Set the queue title
    #[must_use]
    pub fn with_queue_title(mut self, title: impl Into<String>) -> Self {
        self.state.queue_title = Some(title.into());
        self
    }

    /// Add browse children under a parent, enabling the browse service
    #[must_use]
    pub fn with_children(mut self, parent: impl Into<String>, children: Vec<BrowseItem>) -> Self {
        self.browse
            .get_or_insert_with(BrowseProfile::default)
            .children
            .insert(parent.into(), children);
        self
    }

    /// Add a root hint, enabling the browse service
    #[must_use]
    pub fn with_root_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.browse
            .get_or_insert_with(BrowseProfile::default)
            .extras
            .insert(key.into(), value.into());
        self
    }

    /// Script the reaction to a command. An empty script makes the session ignore it.
    #[must_use]
    pub fn with_reaction(mut self, command: impl Into<String>, events: Vec<SessionEvent>) -> Self {
        self.reactions.insert(command.into(), events);
        self
    }

    /// Refuse every connection attempt
    #[must_use]
    pub const fn refusing_connections(mut self) -> Self {
        self.refuse_connection = true;
        self
    }
}

/// Connectable endpoint backed by a [`TargetProfile`]
#[derive(Debug)]
pub struct SimulatedEndpoint {
    profile: TargetProfile,
    connects: AtomicUsize,
    controller: Mutex<Option<Arc<SimulatedController>>>,
}

impl SimulatedEndpoint {
    /// Create an endpoint for a profile
    #[must_use]
    pub fn new(profile: TargetProfile) -> Self {
        Self {
            profile,
            connects: AtomicUsize::new(0),
            controller: Mutex::new(None),
        }
    }

    /// Profile this endpoint serves
    #[must_use]
    pub fn profile(&self) -> &TargetProfile {
        &self.profile
    }

    /// Number of connection attempts
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Controller of the latest connection
    #[must_use]
    pub fn controller(&self) -> Option<Arc<SimulatedController>> {
        lock_unpoisoned(&self.controller).clone()
    }
}

#[async_trait]
impl SessionEndpoint for SimulatedEndpoint {
    async fn connect(&self, target: &TargetApplication) -> ProbeResult<SessionLink> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.profile.refuse_connection {
            return Err(ProbeError::ConnectionFailed {
                package: target.package.clone(),
                message: "connection refused by media session".to_string(),
            });
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Arc::new(SimulatedController {
            state: Mutex::new(self.profile.state.clone()),
            reactions: self.profile.reactions.clone(),
            events: tx,
            dispatched: Mutex::new(Vec::new()),
        });
        *lock_unpoisoned(&self.controller) = Some(Arc::clone(&controller));

        let browser = self.profile.browse.clone().map(|browse| {
            Arc::new(SimulatedBrowser { browse }) as Arc<dyn MediaBrowser>
        });
        Ok(SessionLink {
            controller,
            browser,
            events: rx,
        })
    }
}

/// Transport side of a simulated session
#[derive(Debug)]
pub struct SimulatedController {
    state: Mutex<SessionSnapshot>,
    reactions: BTreeMap<String, Vec<SessionEvent>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    dispatched: Mutex<Vec<TransportCommand>>,
}

impl SimulatedController {
    /// Push an event as if the session had emitted it
    pub fn emit(&self, event: SessionEvent) -> bool {
        apply(&mut lock_unpoisoned(&self.state), &event);
        self.events.send(event).is_ok()
    }

    /// Commands received so far
    #[must_use]
    pub fn dispatched(&self) -> Vec<TransportCommand> {
        lock_unpoisoned(&self.dispatched).clone()
    }
}

fn apply(state: &mut SessionSnapshot, event: &SessionEvent) {
    match event {
        SessionEvent::Playback(playback) => state.playback.clone_from(playback),
        SessionEvent::Metadata(metadata) => state.metadata.clone_from(metadata),
        SessionEvent::RepeatMode(mode) => state.repeat_mode = *mode,
        SessionEvent::ShuffleMode(mode) => state.shuffle_mode = *mode,
        SessionEvent::QueueTitle(title) => state.queue_title.clone_from(title),
        SessionEvent::Queue(queue) => state.queue.clone_from(queue),
        SessionEvent::Destroyed => {}
    }
}

impl MediaController for SimulatedController {
    fn snapshot(&self) -> SessionSnapshot {
        lock_unpoisoned(&self.state).clone()
    }

    fn dispatch(&self, command: &TransportCommand) -> ProbeResult<()> {
        lock_unpoisoned(&self.dispatched).push(command.clone());
        let reaction = match self.reactions.get(command.key()) {
            Some(script) => script.clone(),
            None => default_reaction(&self.snapshot(), command),
        };
        tracing::debug!(%command, events = reaction.len(), "simulated session reacting");
        for event in reaction {
            if !self.emit(event) {
                return Err(ProbeError::session("simulated session is closed"));
            }
        }
        Ok(())
    }
}

/// What a well-behaved player emits in response to a command
fn default_reaction(snapshot: &SessionSnapshot, command: &TransportCommand) -> Vec<SessionEvent> {
    let current = snapshot.playback.clone().unwrap_or_default();
    let position = current.position_ms;
    let playback = |state, position_ms| SessionEvent::Playback(Some(current.moved_to(state, position_ms)));

    match command {
        TransportCommand::Play => vec![
            playback(PlaybackState::Buffering, position),
            playback(PlaybackState::Playing, position),
        ],
        TransportCommand::Pause if current.state == PlaybackState::Stopped => {
            vec![playback(PlaybackState::Stopped, position)]
        }
        TransportCommand::Pause => vec![playback(PlaybackState::Paused, position)],
        TransportCommand::Stop => vec![playback(PlaybackState::Stopped, 0)],
        TransportCommand::SeekTo { position_ms } => vec![playback(current.state, *position_ms)],
        TransportCommand::SkipToNext
        | TransportCommand::SkipToPrevious
        | TransportCommand::SkipToQueueItem { .. } => match skip_target(snapshot, command) {
            Some(item) => vec![
                SessionEvent::Metadata(Some(item.to_metadata())),
                SessionEvent::Playback(Some(
                    current
                        .moved_to(PlaybackState::Playing, 0)
                        .with_active_item(item.queue_id),
                )),
            ],
            None => vec![
                SessionEvent::Metadata(snapshot.metadata.clone()),
                playback(current.state, position),
            ],
        },
        TransportCommand::PlayFromSearch { .. }
        | TransportCommand::PlayFromMediaId { .. }
        | TransportCommand::PlayFromUri { .. } => vec![
            playback(PlaybackState::Buffering, 0),
            SessionEvent::Metadata(Some(resolve_media(snapshot, command))),
            playback(PlaybackState::Playing, 0),
        ],
    }
}

fn active_index(snapshot: &SessionSnapshot) -> Option<usize> {
    let queue = &snapshot.queue;
    snapshot
        .playback
        .as_ref()
        .and_then(|p| p.active_queue_item_id)
        .and_then(|id| queue.iter().position(|q| q.queue_id == id))
        .or_else(|| {
            let media_id = &snapshot.metadata.as_ref()?.media_id;
            queue.iter().position(|q| &q.media_id == media_id)
        })
}

fn skip_target<'a>(snapshot: &'a SessionSnapshot, command: &TransportCommand) -> Option<&'a QueueItem> {
    let queue = &snapshot.queue;
    match command {
        TransportCommand::SkipToNext => match active_index(snapshot) {
            Some(index) => queue.get(index + 1),
            None => queue.first(),
        },
        TransportCommand::SkipToPrevious => queue.get(active_index(snapshot)?.checked_sub(1)?),
        TransportCommand::SkipToQueueItem { queue_id } => {
            queue.iter().find(|q| q.queue_id == *queue_id)
        }
        _ => None,
    }
}

fn resolve_media(snapshot: &SessionSnapshot, command: &TransportCommand) -> MetadataSnapshot {
    let queue = &snapshot.queue;
    let (found, fallback) = match command {
        TransportCommand::PlayFromMediaId { media_id } => (
            queue.iter().find(|q| &q.media_id == media_id),
            media_id.as_str(),
        ),
        TransportCommand::PlayFromUri { uri } => (
            queue.iter().find(|q| q.media_uri.as_ref() == Some(uri)),
            uri.as_str(),
        ),
        TransportCommand::PlayFromSearch { query } => {
            let needle = query.to_lowercase();
            (
                queue
                    .iter()
                    .find(|q| q.title.to_lowercase().contains(&needle))
                    .or_else(|| queue.first()),
                query.as_str(),
            )
        }
        _ => (None, ""),
    };
    found.map_or_else(
        || MetadataSnapshot::new(fallback, fallback),
        QueueItem::to_metadata,
    )
}

/// Browse side of a simulated session
#[derive(Debug)]
pub struct SimulatedBrowser {
    browse: BrowseProfile,
}

#[async_trait]
impl MediaBrowser for SimulatedBrowser {
    fn root(&self) -> BrowseRoot {
        BrowseRoot {
            root_id: self.browse.root_id.clone(),
            extras: self.browse.extras.clone(),
        }
    }

    async fn children(&self, parent_id: &str) -> ProbeResult<Vec<BrowseItem>> {
        Ok(self.browse.children.get(parent_id).cloned().unwrap_or_default())
    }
}
