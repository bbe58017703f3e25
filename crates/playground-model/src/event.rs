use serde::{Deserialize, Serialize};

use crate::{ServiceName, SessionId, TaskStatus};

/// Discriminant of [`RunnerEvent`], handy for routing and log levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    // images
    ImagePulling,
    ImagePulled,

    // lifecycle
    StatusChanged,
    ServiceCrashed,

    // teardown
    TeardownStarted,
    TeardownFinished,
}

/// Lifecycle notification emitted by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunnerEvent {
    /// Image pull began on behalf of `service`.
    ImagePulling { service: ServiceName, image: String },
    /// Image is available locally for `service`.
    ImagePulled { service: ServiceName, image: String },
    StatusChanged {
        service: ServiceName,
        from: TaskStatus,
        to: TaskStatus,
    },
    /// A service exited after it had become healthy.
    ServiceCrashed { service: ServiceName, reason: String },
    TeardownStarted { session: SessionId },
    /// Teardown is over; `errors` holds the steps that failed.
    TeardownFinished {
        session: SessionId,
        errors: Vec<String>,
    },
}

impl RunnerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            RunnerEvent::ImagePulling { .. } => EventKind::ImagePulling,
            RunnerEvent::ImagePulled { .. } => EventKind::ImagePulled,
            RunnerEvent::StatusChanged { .. } => EventKind::StatusChanged,
            RunnerEvent::ServiceCrashed { .. } => EventKind::ServiceCrashed,
            RunnerEvent::TeardownStarted { .. } => EventKind::TeardownStarted,
            RunnerEvent::TeardownFinished { .. } => EventKind::TeardownFinished,
        }
    }

    /// Service the event is about, if any.
    pub fn service(&self) -> Option<&str> {
        match self {
            RunnerEvent::ImagePulling { service, .. }
            | RunnerEvent::ImagePulled { service, .. }
            | RunnerEvent::StatusChanged { service, .. }
            | RunnerEvent::ServiceCrashed { service, .. } => Some(service),
            RunnerEvent::TeardownStarted { .. } | RunnerEvent::TeardownFinished { .. } => None,
        }
    }
}

/// Receiver of [`RunnerEvent`]s.
///
/// Called synchronously from the emitting task, never while the runner
/// holds its state lock, so an observer may update task state itself.
/// Implementations must not block.
pub trait Observe: Send + Sync {
    fn on_event(&self, event: &RunnerEvent);

    fn name(&self) -> &'static str {
        "observer"
    }
}
