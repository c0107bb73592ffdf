//! Configuration management for Keygate.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{KeygateError, Result};
use crate::ratelimit::{AdmissionControl, FixedIntervalLimiter, SlidingWindowLimiter};

/// Which admission strategy a deployment uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    SlidingWindow,
    FixedInterval,
}

/// Main configuration for Keygate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeygateConfig {
    /// Admission strategy to deploy
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,

    /// Sliding-window strategy parameters
    #[serde(default)]
    pub sliding_window: SlidingWindowConfig,

    /// Fixed-interval strategy parameters
    #[serde(default)]
    pub fixed_interval: FixedIntervalConfig,

    /// Synthetic traffic parameters for the demo driver
    #[serde(default)]
    pub simulation: SimulationConfig,
}

impl Default for KeygateConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            sliding_window: SlidingWindowConfig::default(),
            fixed_interval: FixedIntervalConfig::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

fn default_strategy() -> Strategy {
    Strategy::SlidingWindow
}

/// Sliding-window strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Trailing window duration in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: f64,

    /// Maximum admitted events per key within the window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_requests: default_max_requests(),
        }
    }
}

fn default_window_secs() -> f64 {
    10.0
}

fn default_max_requests() -> u32 {
    1
}

/// Fixed-interval strategy parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedIntervalConfig {
    /// Minimum spacing between admitted events for one key, in seconds
    #[serde(default = "default_min_interval_secs")]
    pub min_interval_secs: f64,
}

impl Default for FixedIntervalConfig {
    fn default() -> Self {
        Self {
            min_interval_secs: default_min_interval_secs(),
        }
    }
}

fn default_min_interval_secs() -> f64 {
    10.0
}

/// Synthetic traffic parameters for the demo driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Messages sent per simulation phase
    #[serde(default = "default_messages_per_phase")]
    pub messages_per_phase: u32,

    /// Number of distinct simulated users the traffic rotates through
    #[serde(default = "default_simulated_users")]
    pub simulated_users: u32,

    /// Pause between the two phases, in seconds
    #[serde(default = "default_pause_secs")]
    pub pause_secs: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            messages_per_phase: default_messages_per_phase(),
            simulated_users: default_simulated_users(),
            pause_secs: default_pause_secs(),
        }
    }
}

fn default_messages_per_phase() -> u32 {
    10
}

fn default_simulated_users() -> u32 {
    5
}

fn default_pause_secs() -> f64 {
    4.0
}

impl KeygateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: KeygateConfig =
            serde_yaml::from_str(yaml).map_err(|e| KeygateError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject parameters the limiters cannot express.
    ///
    /// Zero durations and a zero request limit are accepted; they have
    /// documented degenerate behavior rather than being configuration errors.
    fn validate(&self) -> Result<()> {
        for (name, secs) in [
            ("sliding_window.window_secs", self.sliding_window.window_secs),
            (
                "fixed_interval.min_interval_secs",
                self.fixed_interval.min_interval_secs,
            ),
            ("simulation.pause_secs", self.simulation.pause_secs),
        ] {
            if !secs.is_finite() || secs < 0.0 {
                return Err(KeygateError::Config(format!(
                    "{name} must be a non-negative number of seconds, got {secs}"
                )));
            }
        }
        Ok(())
    }

    /// Build the configured limiter behind the shared admission contract.
    pub fn build_limiter(&self) -> Arc<dyn AdmissionControl> {
        match self.strategy {
            Strategy::SlidingWindow => Arc::new(SlidingWindowLimiter::new(
                Duration::from_secs_f64(self.sliding_window.window_secs),
                self.sliding_window.max_requests,
            )),
            Strategy::FixedInterval => Arc::new(FixedIntervalLimiter::new(Duration::from_secs_f64(
                self.fixed_interval.min_interval_secs,
            ))),
        }
    }
}
