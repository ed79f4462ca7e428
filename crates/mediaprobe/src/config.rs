//! Engine configuration.

use crate::result::{ProbeError, ProbeResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default upper bound for an evaluator to reach a verdict (30 seconds)
pub const DEFAULT_EVALUATION_TIMEOUT_MS: u64 = 30_000;

/// Platform level assumed when none is configured
pub const DEFAULT_PLATFORM_LEVEL: u32 = 34;

/// Platform level required by the browse-tree and artwork tests
pub const GATED_PLATFORM_LEVEL: u32 = 24;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Upper bound for an evaluator to reach a verdict, in milliseconds
    pub evaluation_timeout_ms: u64,
    /// Platform level tests are gated against
    pub platform_level: u32,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            evaluation_timeout_ms: DEFAULT_EVALUATION_TIMEOUT_MS,
            platform_level: DEFAULT_PLATFORM_LEVEL,
        }
    }
}

impl ProbeConfig {
    /// Create the default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the evaluation timeout
    #[must_use]
    pub const fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.evaluation_timeout_ms = ms;
        self
    }

    /// Set the platform level
    #[must_use]
    pub const fn with_platform_level(mut self, level: u32) -> Self {
        self.platform_level = level;
        self
    }

    /// Evaluation timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    /// Reject settings no run could honor
    pub fn validate(&self) -> ProbeResult<()> {
        if self.evaluation_timeout_ms == 0 {
            return Err(ProbeError::invalid_argument(
                "evaluation_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Load from YAML text
    pub fn from_yaml(yaml: &str) -> ProbeResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> ProbeResult<Self> {
        Self::from_yaml(&std::fs::read_to_string(path)?)
    }
}
