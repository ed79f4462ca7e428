//! State observation channel.
//!
//! One latest-value stream per tracked dimension of the session. A new
//! observer sees the most recent value immediately and every later
//! publication in order; intermediate values published before it subscribed
//! are gone. Every publication counts as a change, including one that
//! repeats the previous value.
//!
//! Evaluators read playback and metadata through a [`ChangeStream`], which
//! delivers every publication in arrival order across both dimensions.

use crate::format::{format_metadata, format_playback_state, format_queue_size};
use crate::model::{
    MetadataSnapshot, PlaybackStateSnapshot, QueueItem, RepeatMode, SessionEvent,
    SessionSnapshot, ShuffleMode,
};
use tokio::sync::{broadcast, watch};

/// Changes a slow [`ChangeStream`] may fall behind by before it skips ahead
pub const CHANGE_BUFFER: usize = 256;

/// Publishing side of the observation channel
#[derive(Debug)]
pub struct StateChannel {
    playback: watch::Sender<Option<PlaybackStateSnapshot>>,
    metadata: watch::Sender<Option<MetadataSnapshot>>,
    repeat_mode: watch::Sender<RepeatMode>,
    shuffle_mode: watch::Sender<ShuffleMode>,
    queue_title: watch::Sender<Option<String>>,
    queue: watch::Sender<Vec<QueueItem>>,
    changes: broadcast::Sender<Change>,
}

impl Default for StateChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl StateChannel {
    /// Create a channel with every dimension unset
    #[must_use]
    pub fn new() -> Self {
        Self {
            playback: watch::channel(None).0,
            metadata: watch::channel(None).0,
            repeat_mode: watch::channel(RepeatMode::None).0,
            shuffle_mode: watch::channel(ShuffleMode::None).0,
            queue_title: watch::channel(None).0,
            queue: watch::channel(Vec::new()).0,
            changes: broadcast::channel(CHANGE_BUFFER).0,
        }
    }

    /// Publish the current value of every dimension at once
    pub fn seed(&self, snapshot: SessionSnapshot) {
        self.playback.send_replace(snapshot.playback);
        self.metadata.send_replace(snapshot.metadata);
        self.repeat_mode.send_replace(snapshot.repeat_mode);
        self.shuffle_mode.send_replace(snapshot.shuffle_mode);
        self.queue_title.send_replace(snapshot.queue_title);
        self.queue.send_replace(snapshot.queue);
    }

    /// Publish one session event. Returns `false` for events that carry no state.
    pub fn publish(&self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Playback(state) => {
                self.playback.send_replace(state.clone());
                self.announce(Change::Playback(state));
            }
            SessionEvent::Metadata(metadata) => {
                self.metadata.send_replace(metadata.clone());
                self.announce(Change::Metadata(metadata));
            }
            SessionEvent::RepeatMode(mode) => {
                self.repeat_mode.send_replace(mode);
            }
            SessionEvent::ShuffleMode(mode) => {
                self.shuffle_mode.send_replace(mode);
            }
            SessionEvent::QueueTitle(title) => {
                self.queue_title.send_replace(title);
            }
            SessionEvent::Queue(queue) => {
                self.queue.send_replace(queue);
            }
            SessionEvent::Destroyed => return false,
        }
        true
    }

    fn announce(&self, change: Change) {
        // No live stream is not an error
        let _ = self.changes.send(change);
    }

    /// Latest value of every dimension
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            playback: self.playback.borrow().clone(),
            metadata: self.metadata.borrow().clone(),
            repeat_mode: *self.repeat_mode.borrow(),
            shuffle_mode: *self.shuffle_mode.borrow(),
            queue_title: self.queue_title.borrow().clone(),
            queue: self.queue.borrow().clone(),
        }
    }

    /// Observe playback state
    #[must_use]
    pub fn subscribe_playback(&self) -> watch::Receiver<Option<PlaybackStateSnapshot>> {
        self.playback.subscribe()
    }

    /// Observe metadata
    #[must_use]
    pub fn subscribe_metadata(&self) -> watch::Receiver<Option<MetadataSnapshot>> {
        self.metadata.subscribe()
    }

    /// Observe repeat mode
    #[must_use]
    pub fn subscribe_repeat_mode(&self) -> watch::Receiver<RepeatMode> {
        self.repeat_mode.subscribe()
    }

    /// Observe shuffle mode
    #[must_use]
    pub fn subscribe_shuffle_mode(&self) -> watch::Receiver<ShuffleMode> {
        self.shuffle_mode.subscribe()
    }

    /// Observe queue title
    #[must_use]
    pub fn subscribe_queue_title(&self) -> watch::Receiver<Option<String>> {
        self.queue_title.subscribe()
    }

    /// Observe queue contents
    #[must_use]
    pub fn subscribe_queue(&self) -> watch::Receiver<Vec<QueueItem>> {
        self.queue.subscribe()
    }

    /// Stream of playback and metadata changes published after this call
    #[must_use]
    pub fn changes(&self) -> ChangeStream {
        ChangeStream {
            changes: self.changes.subscribe(),
        }
    }

    /// Formatted playback state
    #[must_use]
    pub fn playback_state_text(&self) -> String {
        format_playback_state(self.playback.borrow().as_ref())
    }

    /// Formatted metadata
    #[must_use]
    pub fn metadata_text(&self) -> String {
        format_metadata(self.metadata.borrow().as_ref())
    }

    /// Formatted repeat mode
    #[must_use]
    pub fn repeat_mode_text(&self) -> String {
        self.repeat_mode.borrow().name().to_string()
    }

    /// Formatted shuffle mode
    #[must_use]
    pub fn shuffle_mode_text(&self) -> String {
        self.shuffle_mode.borrow().name().to_string()
    }

    /// Formatted queue title
    #[must_use]
    pub fn queue_title_text(&self) -> String {
        self.queue_title.borrow().clone().unwrap_or_default()
    }

    /// Formatted queue size
    #[must_use]
    pub fn queue_text(&self) -> String {
        format_queue_size(&self.queue.borrow())
    }
}

/// A playback or metadata change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    /// New playback state
    Playback(Option<PlaybackStateSnapshot>),
    /// New metadata
    Metadata(Option<MetadataSnapshot>),
}

/// Playback and metadata changes in the order the session published them
#[derive(Debug)]
pub struct ChangeStream {
    changes: broadcast::Receiver<Change>,
}

impl ChangeStream {
    /// Wait for the next change. `None` once the channel is gone.
    pub async fn next(&mut self) -> Option<Change> {
        loop {
            match self.changes.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "change stream fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
