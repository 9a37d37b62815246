//! Node-level state machine values.

use serde::{Deserialize, Serialize};

/// The state of a single node within a running execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    /// Not yet schedulable; inbound edges outstanding.
    Pending,
    /// All required inputs delivered; queued for dispatch.
    Ready,
    /// Runner currently executing.
    Running,
    /// Paused on a wait signal (human interaction or timer).
    Waiting,
    /// Failed transiently; another attempt is scheduled.
    Retrying,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
    /// Never ran — all inbound edges were skipped or a branch bypassed it.
    Skipped,
    /// A wait deadline passed with `timeout_action = fail`.
    TimedOut,
    /// Cancelled before or during execution.
    Cancelled,
}

impl NodeState {
    /// Returns `true` if the node has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Skipped | Self::TimedOut | Self::Cancelled
        )
    }

    /// Returns `true` if the node is currently doing work.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Retrying)
    }

    /// Returns `true` if the node finished successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Ready => write!(f, "ready"),
            Self::Running => write!(f, "running"),
            Self::Waiting => write!(f, "waiting"),
            Self::Retrying => write!(f, "retrying"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}
