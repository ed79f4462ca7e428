//! Mediaprobe: conformance test engine for media playback sessions
//!
//! Mediaprobe drives a third-party media application's playback session
//! through the media-session protocol, watches the state changes the
//! session emits in response, and renders a PASS / FAIL / OPTIONAL_FAIL
//! verdict per test.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                    MEDIAPROBE Architecture                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐             │
//! │  │ Coordinator │──►│ Evaluator   │──►│ Session     │──► target   │
//! │  │ (admission, │   │ (per-test   │   │ Manager     │    session  │
//! │  │  run logs)  │   │  machines)  │   │             │             │
//! │  └──────┬──────┘   └──────▲──────┘   └──────┬──────┘             │
//! │         │                 │ changes         │ events             │
//! │  ┌──────▼──────┐   ┌──────┴─────────────────▼──────┐             │
//! │  │ Registry    │   │ State Observation Channel     │             │
//! │  │ (catalog)   │   │ (latest-value streams)        │             │
//! │  └─────────────┘   └───────────────────────────────┘             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use mediaprobe::{
//!     ProbeConfig, SessionManager, SimulatedEndpoint, StaticDisplayText, TargetProfile,
//!     TestCoordinator,
//! };
//! use std::sync::Arc;
//!
//! # async fn demo() -> mediaprobe::ProbeResult<()> {
//! let profile = TargetProfile::from_file("target.yaml")?;
//! let target = profile.target.clone();
//! let manager = SessionManager::new(target, Arc::new(SimulatedEndpoint::new(profile)));
//! let session = manager.connect().await?;
//!
//! let coordinator = TestCoordinator::for_session(session, &StaticDisplayText, ProbeConfig::default());
//! let verdict = coordinator.run_test(0, "")?.finish().await;
//! println!("play: {verdict}");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

mod config;
mod coordinator;
pub mod evaluator;
pub mod format;
pub mod model;
pub mod observe;
mod registry;
mod report;
mod result;
pub mod session;
pub mod sim;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub use config::{
    ProbeConfig, DEFAULT_EVALUATION_TIMEOUT_MS, DEFAULT_PLATFORM_LEVEL, GATED_PLATFORM_LEVEL,
};
pub use coordinator::{RunTicket, RunningState, TestCoordinator};
pub use evaluator::{EvalContext, Evaluator, TestLogger, TestResult};
pub use model::{
    BrowseItem, BrowseRoot, CustomAction, IconKind, MetadataSnapshot, PlaybackState,
    PlaybackStateSnapshot, QueueItem, RepeatMode, SessionEvent, SessionSnapshot, ShuffleMode,
    TargetApplication, TransportCommand,
};
pub use observe::{Change, ChangeStream, StateChannel};
pub use registry::{
    build_tests, DisplayText, StaticDisplayText, TestDefinition, TestId, TestKind, Tier,
};
pub use report::{Outcome, SuiteReport, TestOutcome};
pub use result::{ProbeError, ProbeResult};
pub use session::{
    ConnectionStatus, MediaBrowser, MediaController, SessionEndpoint, SessionHandle, SessionLink,
    SessionManager, SessionRegistry,
};
pub use sim::{SimulatedEndpoint, TargetProfile};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
