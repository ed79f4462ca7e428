//! Connection lifecycle and the per-target manager registry.

use super::{SessionEndpoint, SessionHandle};
use crate::lock_unpoisoned;
use crate::model::{SessionEvent, TargetApplication};
use crate::observe::StateChannel;
use crate::result::{ProbeError, ProbeResult};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Connection status published by a [`SessionManager`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Not connected
    Disconnected,
    /// Connection in progress
    Connecting,
    /// Connected and ready
    Connected,
    /// Connection attempt failed
    Failed(String),
}

struct Connection {
    handle: SessionHandle,
    token: CancellationToken,
    pump: JoinHandle<()>,
}

/// Owns the connection to one target's media session.
///
/// Connecting while already connected returns the existing handle.
/// Disconnecting cancels every evaluator still waiting on the session.
pub struct SessionManager {
    target: TargetApplication,
    endpoint: Arc<dyn SessionEndpoint>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    connection: Mutex<Option<Connection>>,
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("package", &self.target.package)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a manager for a target
    #[must_use]
    pub fn new(target: TargetApplication, endpoint: Arc<dyn SessionEndpoint>) -> Self {
        Self {
            target,
            endpoint,
            status: Arc::new(watch::channel(ConnectionStatus::Disconnected).0),
            connection: Mutex::new(None),
        }
    }

    /// The target this manager connects to
    #[must_use]
    pub fn target(&self) -> &TargetApplication {
        &self.target
    }

    /// Observe connection status
    #[must_use]
    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Handle of the live connection
    pub fn handle(&self) -> ProbeResult<SessionHandle> {
        self.live_handle().ok_or_else(|| ProbeError::NotConnected {
            package: self.target.package.clone(),
        })
    }

    fn live_handle(&self) -> Option<SessionHandle> {
        lock_unpoisoned(&self.connection)
            .as_ref()
            .filter(|c| !c.token.is_cancelled())
            .map(|c| c.handle.clone())
    }

    /// Connect to the session, or return the live connection.
    pub async fn connect(&self) -> ProbeResult<SessionHandle> {
        if let Some(handle) = self.live_handle() {
            return Ok(handle);
        }

        let package = self.target.package.clone();
        self.status.send_replace(ConnectionStatus::Connecting);
        tracing::info!(package = %package, "connecting to media session");

        let link = match self.endpoint.connect(&self.target).await {
            Ok(link) => link,
            Err(err) => {
                let err = match err {
                    ProbeError::ConnectionFailed { .. } => err,
                    other => ProbeError::ConnectionFailed {
                        package: package.clone(),
                        message: other.to_string(),
                    },
                };
                tracing::warn!(package = %package, error = %err, "connection failed");
                self.status
                    .send_replace(ConnectionStatus::Failed(err.to_string()));
                return Err(err);
            }
        };

        let mut slot = lock_unpoisoned(&self.connection);
        if let Some(existing) = slot.as_ref().filter(|c| !c.token.is_cancelled()) {
            return Ok(existing.handle.clone());
        }

        let channel = Arc::new(StateChannel::new());
        channel.seed(link.controller.snapshot());

        let token = CancellationToken::new();
        let handle = SessionHandle::new(
            self.target.clone(),
            link.controller,
            link.browser,
            Arc::clone(&channel),
            token.clone(),
        );
        let pump = tokio::spawn(pump_events(
            link.events,
            channel,
            token.clone(),
            Arc::clone(&self.status),
        ));

        if let Some(stale) = slot.replace(Connection {
            handle: handle.clone(),
            token,
            pump,
        }) {
            stale.pump.abort();
        }
        drop(slot);

        self.status.send_replace(ConnectionStatus::Connected);
        tracing::info!(package = %package, "media session connected");
        Ok(handle)
    }

    /// Release the connection. Safe to call any number of times.
    pub fn disconnect(&self) {
        let Some(connection) = lock_unpoisoned(&self.connection).take() else {
            return;
        };
        connection.token.cancel();
        connection.pump.abort();
        self.status.send_replace(ConnectionStatus::Disconnected);
        tracing::info!(package = %self.target.package, "media session disconnected");
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        self.disconnect();
    }
}

async fn pump_events(
    mut events: mpsc::UnboundedReceiver<SessionEvent>,
    channel: Arc<StateChannel>,
    token: CancellationToken,
    status: Arc<watch::Sender<ConnectionStatus>>,
) {
    loop {
        let event = tokio::select! {
            () = token.cancelled() => return,
            event = events.recv() => event,
        };
        match event {
            Some(SessionEvent::Destroyed) | None => {
                tracing::warn!("media session went away");
                token.cancel();
                status.send_replace(ConnectionStatus::Disconnected);
                return;
            }
            Some(event) => {
                tracing::trace!(?event, "session event");
                channel.publish(event);
            }
        }
    }
}

/// Session managers keyed by target package.
///
/// Asking twice for the same package yields the same manager, so two
/// inspections of one target never open competing connections.
#[derive(Default)]
pub struct SessionRegistry {
    managers: Mutex<HashMap<String, Arc<SessionManager>>>,
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let managers = lock_unpoisoned(&self.managers);
        f.debug_struct("SessionRegistry")
            .field("packages", &managers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SessionRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager for a target, created on first request
    pub fn manager_for(
        &self,
        target: &TargetApplication,
        endpoint: Arc<dyn SessionEndpoint>,
    ) -> Arc<SessionManager> {
        let mut managers = lock_unpoisoned(&self.managers);
        Arc::clone(
            managers
                .entry(target.package.clone())
                .or_insert_with(|| Arc::new(SessionManager::new(target.clone(), endpoint))),
        )
    }

    /// Existing manager for a package
    #[must_use]
    pub fn get(&self, package: &str) -> Option<Arc<SessionManager>> {
        lock_unpoisoned(&self.managers).get(package).cloned()
    }

    /// Disconnect and forget a package's manager
    pub fn release(&self, package: &str) -> bool {
        let removed = lock_unpoisoned(&self.managers).remove(package);
        match removed {
            Some(manager) => {
                manager.disconnect();
                true
            }
            None => false,
        }
    }

    /// Number of managed targets
    #[must_use]
    pub fn len(&self) -> usize {
        lock_unpoisoned(&self.managers).len()
    }

    /// Whether no target is managed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MetadataSnapshot, PlaybackState, PlaybackStateSnapshot};
    use crate::observe::Change;
    use crate::sim::{SimulatedEndpoint, TargetProfile};

    fn paused_profile(package: &str) -> TargetProfile {
        TargetProfile::new(TargetApplication::new(package))
            .with_playback(PlaybackStateSnapshot::new(PlaybackState::Paused, 1_000))
            .with_metadata(MetadataSnapshot::new("a", "Song A"))
    }

    #[tokio::test]
    async fn test_connect_seeds_state() {
        let endpoint = Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a")));
        let manager = SessionManager::new(TargetApplication::new("com.example.a"), endpoint);

        let handle = manager.connect().await.unwrap();
        assert_eq!(*manager.status().borrow(), ConnectionStatus::Connected);
        let state = handle.playback_state().unwrap().unwrap();
        assert_eq!(state.state, PlaybackState::Paused);
        assert_eq!(handle.metadata().unwrap().unwrap().media_id, "a");
        assert_eq!(
            handle.initial_playback_state().unwrap().unwrap().state,
            PlaybackState::Paused
        );
    }

    #[tokio::test]
    async fn test_connect_twice_reuses_connection() {
        let endpoint = Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a")));
        let manager = SessionManager::new(
            TargetApplication::new("com.example.a"),
            Arc::clone(&endpoint) as Arc<dyn SessionEndpoint>,
        );

        let first = manager.connect().await.unwrap();
        let second = manager.connect().await.unwrap();
        assert!(first.is_connected() && second.is_connected());
        assert_eq!(endpoint.connect_count(), 1);
    }

    #[tokio::test]
    async fn test_refused_connection() {
        let profile = paused_profile("com.example.a").refusing_connections();
        let manager = SessionManager::new(
            TargetApplication::new("com.example.a"),
            Arc::new(SimulatedEndpoint::new(profile)),
        );

        let err = manager.connect().await.unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionFailed { .. }));
        assert!(matches!(
            *manager.status().borrow(),
            ConnectionStatus::Failed(_)
        ));
        assert!(manager.handle().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_invalidates_handle_and_is_idempotent() {
        let manager = SessionManager::new(
            TargetApplication::new("com.example.a"),
            Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a"))),
        );
        let handle = manager.connect().await.unwrap();

        manager.disconnect();
        manager.disconnect();

        assert!(!handle.is_connected());
        assert!(matches!(
            handle.playback_state(),
            Err(ProbeError::NotConnected { .. })
        ));
        assert!(handle.dispatch(&crate::model::TransportCommand::Play).is_err());
        assert_eq!(*manager.status().borrow(), ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_events_reach_channel() {
        let endpoint = Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a")));
        let manager = SessionManager::new(
            TargetApplication::new("com.example.a"),
            Arc::clone(&endpoint) as Arc<dyn SessionEndpoint>,
        );
        let handle = manager.connect().await.unwrap();
        let mut changes = handle.changes().unwrap();

        endpoint
            .controller()
            .unwrap()
            .emit(SessionEvent::Playback(Some(PlaybackStateSnapshot::new(
                PlaybackState::Playing,
                0,
            ))));

        let change = changes.next().await.unwrap();
        assert!(matches!(change, Change::Playback(Some(ref s)) if s.state == PlaybackState::Playing));
        assert_eq!(
            handle.playback_state().unwrap().unwrap().state,
            PlaybackState::Playing
        );
    }

    #[tokio::test]
    async fn test_destroyed_session_disconnects() {
        let endpoint = Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a")));
        let manager = SessionManager::new(
            TargetApplication::new("com.example.a"),
            Arc::clone(&endpoint) as Arc<dyn SessionEndpoint>,
        );
        let handle = manager.connect().await.unwrap();
        let token = handle.cancellation();

        endpoint.controller().unwrap().emit(SessionEvent::Destroyed);
        token.cancelled().await;

        assert!(!handle.is_connected());
        assert!(manager.handle().is_err());
    }

    #[tokio::test]
    async fn test_registry_memoizes_by_package() {
        let registry = SessionRegistry::new();
        let target_a = TargetApplication::new("com.example.a");
        let target_b = TargetApplication::new("com.example.b");

        let a1 = registry.manager_for(
            &target_a,
            Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a"))),
        );
        let a2 = registry.manager_for(
            &target_a,
            Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a"))),
        );
        let b = registry.manager_for(
            &target_b,
            Arc::new(SimulatedEndpoint::new(paused_profile("com.example.b"))),
        );

        assert!(Arc::ptr_eq(&a1, &a2));
        assert!(!Arc::ptr_eq(&a1, &b));
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_registry_release_disconnects() {
        let registry = SessionRegistry::new();
        let target = TargetApplication::new("com.example.a");
        let manager = registry.manager_for(
            &target,
            Arc::new(SimulatedEndpoint::new(paused_profile("com.example.a"))),
        );
        let handle = manager.connect().await.unwrap();

        assert!(registry.release("com.example.a"));
        assert!(!registry.release("com.example.a"));
        assert!(!handle.is_connected());
        assert!(registry.is_empty());
    }
}
