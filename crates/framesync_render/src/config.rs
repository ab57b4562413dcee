//! # Render Configuration
//!
//! Construction parameters for the worker pool, the renderer and the
//! binding resolver. Loaded once at startup, usually from a TOML file:
//!
//! ```toml
//! worker_threads = 4
//! jobs_per_task = 64
//! validation = "checked"
//! idle_poll_interval_us = 500
//! ```
//!
//! Every field is optional; missing fields take their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// How much checking the binding resolver performs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationMode {
    /// Resolved Guids are checked against the owning resource table.
    Checked,
    /// The resource-existence check is skipped for throughput.
    ///
    /// Missing bindings are still reported.
    Unchecked,
}

impl Default for ValidationMode {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Checked
        } else {
            Self::Unchecked
        }
    }
}

/// Configuration for the render core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Number of worker threads recording commands.
    pub worker_threads: usize,
    /// Number of jobs recorded by one pool task.
    pub jobs_per_task: usize,
    /// Binding resolver checking level.
    pub validation: ValidationMode,
    /// Consumer back-off when no new frame is available (microseconds).
    pub idle_poll_interval_us: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            worker_threads: std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(1),
            jobs_per_task: 64,
            validation: ValidationMode::default(),
            idle_poll_interval_us: 500,
        }
    }
}

impl RenderConfig {
    /// Single worker, checked resolution. Keeps tests deterministic.
    #[must_use]
    pub fn single_threaded() -> Self {
        Self {
            worker_threads: 1,
            validation: ValidationMode::Checked,
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// `RenderError::InvalidConfig` if the document does not parse or a
    /// value is out of range.
    pub fn from_toml_str(source: &str) -> RenderResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| RenderError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serializes the configuration back to TOML.
    ///
    /// # Errors
    ///
    /// `RenderError::InvalidConfig` if serialization fails.
    pub fn to_toml_string(&self) -> RenderResult<String> {
        toml::to_string(self).map_err(|e| RenderError::InvalidConfig(e.to_string()))
    }

    /// Rejects values the pool and renderer cannot run with.
    ///
    /// # Errors
    ///
    /// `RenderError::InvalidConfig` naming the offending field.
    pub fn validate(&self) -> RenderResult<()> {
        if self.worker_threads == 0 {
            return Err(RenderError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.jobs_per_task == 0 {
            return Err(RenderError::InvalidConfig(
                "jobs_per_task must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Consumer back-off as a `Duration`.
    #[inline]
    #[must_use]
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_micros(self.idle_poll_interval_us)
    }
}
