//! Session endpoint abstraction and live session handles.
//!
//! A [`SessionEndpoint`] is how the engine reaches a target application's
//! media session. Implementations sit on top of whatever transport the host
//! uses; [`crate::sim::SimulatedEndpoint`] is the in-process one used by the
//! CLI and tests.

mod manager;

pub use manager::{ConnectionStatus, SessionManager, SessionRegistry};

use crate::model::{
    BrowseItem, BrowseRoot, MetadataSnapshot, PlaybackStateSnapshot, QueueItem, RepeatMode,
    SessionEvent, SessionSnapshot, ShuffleMode, TargetApplication, TransportCommand,
};
use crate::observe::{ChangeStream, StateChannel};
use crate::result::{ProbeError, ProbeResult};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Transport side of a connected session
pub trait MediaController: Send + Sync {
    /// Current value of every tracked dimension
    fn snapshot(&self) -> SessionSnapshot;

    /// Issue a transport command. Effects arrive later as session events.
    fn dispatch(&self, command: &TransportCommand) -> ProbeResult<()>;
}

/// Browse side of a connected session
#[async_trait]
pub trait MediaBrowser: Send + Sync {
    /// Root node and its hints
    fn root(&self) -> BrowseRoot;

    /// Children of a browsable node
    async fn children(&self, parent_id: &str) -> ProbeResult<Vec<BrowseItem>>;
}

/// Result of a successful connection
pub struct SessionLink {
    /// Transport controller
    pub controller: Arc<dyn MediaController>,
    /// Browse service, if the target exposes one
    pub browser: Option<Arc<dyn MediaBrowser>>,
    /// Session events in arrival order
    pub events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl fmt::Debug for SessionLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLink")
            .field("has_browser", &self.browser.is_some())
            .finish_non_exhaustive()
    }
}

/// Way of reaching a target's media session
#[async_trait]
pub trait SessionEndpoint: Send + Sync {
    /// Open the session. Fails with [`ProbeError::ConnectionFailed`].
    async fn connect(&self, target: &TargetApplication) -> ProbeResult<SessionLink>;
}

/// Live, connected reference to a target's media session.
///
/// Clones share the same connection. Once the owning [`SessionManager`]
/// disconnects, every accessor fails with [`ProbeError::NotConnected`].
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<HandleInner>,
}

struct HandleInner {
    target: TargetApplication,
    controller: Arc<dyn MediaController>,
    browser: Option<Arc<dyn MediaBrowser>>,
    channel: Arc<StateChannel>,
    initial_playback: Option<PlaybackStateSnapshot>,
    live: CancellationToken,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("package", &self.inner.target.package)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SessionHandle {
    pub(crate) fn new(
        target: TargetApplication,
        controller: Arc<dyn MediaController>,
        browser: Option<Arc<dyn MediaBrowser>>,
        channel: Arc<StateChannel>,
        live: CancellationToken,
    ) -> Self {
        let initial_playback = channel.snapshot().playback;
        Self {
            inner: Arc::new(HandleInner {
                target,
                controller,
                browser,
                channel,
                initial_playback,
                live,
            }),
        }
    }

    /// The application this session belongs to
    #[must_use]
    pub fn target(&self) -> &TargetApplication {
        &self.inner.target
    }

    /// Whether the session is still connected
    #[must_use]
    pub fn is_connected(&self) -> bool {
        !self.inner.live.is_cancelled()
    }

    /// Fail with [`ProbeError::NotConnected`] once disconnected
    pub fn ensure_connected(&self) -> ProbeResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(ProbeError::NotConnected {
                package: self.inner.target.package.clone(),
            })
        }
    }

    /// Token cancelled when the session is torn down
    #[must_use]
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.live.clone()
    }

    /// Current playback state
    pub fn playback_state(&self) -> ProbeResult<Option<PlaybackStateSnapshot>> {
        self.ensure_connected()?;
        Ok(self.inner.channel.snapshot().playback)
    }

    /// Playback state observed when the connection was established
    pub fn initial_playback_state(&self) -> ProbeResult<Option<PlaybackStateSnapshot>> {
        self.ensure_connected()?;
        Ok(self.inner.initial_playback.clone())
    }

    /// Current metadata
    pub fn metadata(&self) -> ProbeResult<Option<MetadataSnapshot>> {
        self.ensure_connected()?;
        Ok(self.inner.channel.snapshot().metadata)
    }

    /// Current repeat mode
    pub fn repeat_mode(&self) -> ProbeResult<RepeatMode> {
        self.ensure_connected()?;
        Ok(self.inner.channel.snapshot().repeat_mode)
    }

    /// Current shuffle mode
    pub fn shuffle_mode(&self) -> ProbeResult<ShuffleMode> {
        self.ensure_connected()?;
        Ok(self.inner.channel.snapshot().shuffle_mode)
    }

    /// Current queue title
    pub fn queue_title(&self) -> ProbeResult<Option<String>> {
        self.ensure_connected()?;
        Ok(self.inner.channel.snapshot().queue_title)
    }

    /// Current queue
    pub fn queue(&self) -> ProbeResult<Vec<QueueItem>> {
        self.ensure_connected()?;
        Ok(self.inner.channel.snapshot().queue)
    }

    /// Issue a transport command
    pub fn dispatch(&self, command: &TransportCommand) -> ProbeResult<()> {
        self.ensure_connected()?;
        self.inner.controller.dispatch(command)
    }

    /// Browse service of the target
    pub fn browser(&self) -> ProbeResult<Arc<dyn MediaBrowser>> {
        self.ensure_connected()?;
        self.inner
            .browser
            .clone()
            .ok_or_else(|| ProbeError::session("target exposes no browse service"))
    }

    /// Playback and metadata changes from now on
    pub fn changes(&self) -> ProbeResult<ChangeStream> {
        self.ensure_connected()?;
        Ok(self.inner.channel.changes())
    }

    /// The observation channel, for hosts that render state
    pub fn observer(&self) -> ProbeResult<Arc<StateChannel>> {
        self.ensure_connected()?;
        Ok(Arc::clone(&self.inner.channel))
    }

    /// Observe playback state
    pub fn subscribe_playback(
        &self,
    ) -> ProbeResult<watch::Receiver<Option<PlaybackStateSnapshot>>> {
        self.ensure_connected()?;
        Ok(self.inner.channel.subscribe_playback())
    }

    /// Observe metadata
    pub fn subscribe_metadata(&self) -> ProbeResult<watch::Receiver<Option<MetadataSnapshot>>> {
        self.ensure_connected()?;
        Ok(self.inner.channel.subscribe_metadata())
    }
}
