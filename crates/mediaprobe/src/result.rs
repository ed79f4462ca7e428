//! Result and error types for Mediaprobe.

use thiserror::Error;

/// Result type for Mediaprobe operations
pub type ProbeResult<T> = Result<T, ProbeError>;

/// Errors that can occur in Mediaprobe
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Session endpoint unreachable or refused the connection
    #[error("Failed to connect to {package}: {message}")]
    ConnectionFailed {
        /// Package of the target application
        package: String,
        /// Error message
        message: String,
    },

    /// Operation attempted on a disconnected or invalidated session
    #[error("Session for {package} is not connected")]
    NotConnected {
        /// Package of the target application
        package: String,
    },

    /// Malformed or missing test query, or malformed launch arguments
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Test precondition unmet on this platform; the test does not execute
    #[error("Test {test_id} requires platform level {required} (running on {actual})")]
    UnsupportedPlatform {
        /// Test that was requested
        test_id: u32,
        /// Minimum platform level
        required: u32,
        /// Current platform level
        actual: u32,
    },

    /// Another test already holds the running slot
    #[error("Test {running} is already running")]
    AlreadyRunning {
        /// Test currently running
        running: u32,
    },

    /// No test with this id in the current catalog
    #[error("Unknown test id {test_id}")]
    UnknownTest {
        /// Requested test id
        test_id: u32,
    },

    /// No run has been started for this test id
    #[error("No run log for test {test_id}")]
    NoRunLog {
        /// Requested test id
        test_id: u32,
    },

    /// Operation timed out
    #[error("Operation timed out after {ms}ms")]
    Timeout {
        /// Timeout in milliseconds
        ms: u64,
    },

    /// The session rejected a command or browse request
    #[error("Session error: {message}")]
    SessionError {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProbeError {
    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::SessionError {
            message: message.into(),
        }
    }

    /// Whether this error means the session is gone
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(self, Self::NotConnected { .. })
    }
}
