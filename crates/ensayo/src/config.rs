//! Run configuration.
//!
//! ```yaml
//! fail_fast: false
//! max_iterations: 10000
//! timeout_ms: 60000
//! cancel_poll_ms: 50
//! log:
//!   level: info
//!   json: false
//! ```

use crate::invoker::DEFAULT_CANCEL_POLL_MS;
use crate::iteration::{IterationExpander, DEFAULT_MAX_ITERATIONS};
use crate::result::{EnsayoError, EnsayoResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    pub level: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
    /// Include the event target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            with_target: false,
        }
    }
}

/// Configuration for one test run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Stop iterating rows after the first failing row
    pub fail_fast: bool,
    /// Upper bound on rows from one producer
    pub max_iterations: usize,
    /// Run-wide deadline in milliseconds
    pub timeout_ms: Option<u64>,
    /// How often interruptible sleeps check for cancellation
    pub cancel_poll_ms: u64,
    /// Logging settings
    pub log: LogConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            fail_fast: false,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_ms: None,
            cancel_poll_ms: DEFAULT_CANCEL_POLL_MS,
            log: LogConfig::default(),
        }
    }
}

impl RunConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate YAML
    pub fn from_yaml_str(yaml: &str) -> EnsayoResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> EnsayoResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Check value ranges
    pub fn validate(&self) -> EnsayoResult<()> {
        if self.max_iterations == 0 {
            return Err(EnsayoError::config("max_iterations must be greater than 0"));
        }
        if self.cancel_poll_ms == 0 {
            return Err(EnsayoError::config("cancel_poll_ms must be greater than 0"));
        }
        if self.timeout_ms == Some(0) {
            return Err(EnsayoError::config("timeout_ms must be greater than 0"));
        }
        Ok(())
    }

    /// Enable or disable fail-fast iteration
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Set the iteration guard
    #[must_use]
    pub const fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Set a run-wide deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Set the cancellation poll interval
    #[must_use]
    pub const fn with_cancel_poll(mut self, poll: Duration) -> Self {
        self.cancel_poll_ms = poll.as_millis() as u64;
        self
    }

    /// Run-wide deadline
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        match self.timeout_ms {
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        }
    }

    /// Cancellation poll interval
    #[must_use]
    pub const fn cancel_poll(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_ms)
    }

    /// Iteration expander for this configuration
    #[must_use]
    pub const fn expander(&self) -> IterationExpander {
        IterationExpander::new(self.max_iterations, self.fail_fast)
    }
}
