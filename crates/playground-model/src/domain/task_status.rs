use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime state of a service.
///
/// Transitions only move forward through the partial order
/// `pending -> (pulling ->)? started -> (healthy ->)? {stopped | failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Registered, nothing launched yet.
    Pending,
    /// Image acquisition in progress.
    Pulling,
    /// Container or process is running.
    Started,
    /// Readiness probe passed (or no probe declared).
    Healthy,
    /// Stopped by teardown, or exited after becoming healthy.
    Stopped,
    /// Failed to launch or exited before becoming healthy.
    Failed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Pulling => 1,
            TaskStatus::Started => 2,
            TaskStatus::Healthy => 3,
            TaskStatus::Stopped | TaskStatus::Failed => 4,
        }
    }

    /// Returns `true` if the task won't transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Stopped | TaskStatus::Failed)
    }

    /// Returns `true` while the underlying container or process is running.
    pub fn is_running(&self) -> bool {
        matches!(self, TaskStatus::Started | TaskStatus::Healthy)
    }

    /// Whether moving from `self` to `next` respects the lifecycle order.
    ///
    /// `healthy` is only reachable from `started`.
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            TaskStatus::Healthy => *self == TaskStatus::Started,
            _ => next.rank() > self.rank(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Pulling => "pulling",
            TaskStatus::Started => "started",
            TaskStatus::Healthy => "healthy",
            TaskStatus::Stopped => "stopped",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
