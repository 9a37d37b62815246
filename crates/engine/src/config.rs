//! Engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

/// Tunables for the engine, the timeout monitor and the resume controller.
///
/// Durations deserialize from humantime strings (`"30s"`, `"15m"`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Worker-pool bound within one execution. 1 means strictly serial.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Per-node wall-clock budget unless the node overrides it.
    #[serde(default = "default_node_timeout", with = "humantime_serde")]
    pub default_node_timeout: Duration,
    /// Retry policy for retryable runner errors.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// How often the timeout monitor scans pause records.
    #[serde(default = "default_monitor_interval", with = "humantime_serde")]
    pub monitor_interval: Duration,
    /// How long before a deadline the warning fires.
    #[serde(default = "default_warning_window", with = "humantime_serde")]
    pub warning_window: Duration,
    /// Grace window for in-flight runners after cancellation.
    #[serde(default = "default_cancel_grace", with = "humantime_serde")]
    pub cancel_grace: Duration,
    /// Default relevance threshold for resume-response classification.
    #[serde(default = "default_relevance_threshold")]
    pub relevance_threshold: f64,
    /// Capacity of the hot log cache (executions).
    #[serde(default = "default_hot_log_capacity")]
    pub hot_log_capacity: usize,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_node_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_monitor_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_warning_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_cancel_grace() -> Duration {
    Duration::from_secs(5)
}

fn default_relevance_threshold() -> f64 {
    0.7
}

fn default_hot_log_capacity() -> usize {
    256
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            default_node_timeout: default_node_timeout(),
            retry: RetryPolicy::default(),
            monitor_interval: default_monitor_interval(),
            warning_window: default_warning_window(),
            cancel_grace: default_cancel_grace(),
            relevance_threshold: default_relevance_threshold(),
            hot_log_capacity: default_hot_log_capacity(),
        }
    }
}

impl EngineConfig {
    /// Set the worker-pool bound.
    #[must_use]
    pub fn with_max_concurrency(mut self, bound: usize) -> Self {
        self.max_concurrency = bound.max(1);
        self
    }

    /// Set the default node timeout.
    #[must_use]
    pub fn with_default_node_timeout(mut self, timeout: Duration) -> Self {
        self.default_node_timeout = timeout;
        self
    }

    /// Set the monitor scan interval.
    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    /// Set the relevance threshold.
    #[must_use]
    pub fn with_relevance_threshold(mut self, threshold: f64) -> Self {
        self.relevance_threshold = threshold.clamp(0.0, 1.0);
        self
    }
}
