use playground_model::{EventKind, Observe, RunnerEvent, TaskStatus};
use tracing::{debug, error, info, warn};

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // images
        EventKind::ImagePulling => "pulling image",
        EventKind::ImagePulled => "image available locally",

        // lifecycle
        EventKind::StatusChanged => "service status changed",
        EventKind::ServiceCrashed => "service exited after becoming healthy (no restart)",

        // teardown
        EventKind::TeardownStarted => "teardown started",
        EventKind::TeardownFinished => "teardown finished",
    }
}

#[inline]
pub fn log_event(e: &RunnerEvent) {
    let msg = message_for(e.kind());

    match e {
        // images
        RunnerEvent::ImagePulling { service, image } => {
            info!(service = %service, image = %image, "{msg}")
        }
        RunnerEvent::ImagePulled { service, image } => {
            debug!(service = %service, image = %image, "{msg}")
        }

        // lifecycle
        RunnerEvent::StatusChanged { service, from, to } => match to {
            TaskStatus::Failed => {
                error!(service = %service, from = %from, to = %to, "{msg}")
            }
            TaskStatus::Healthy | TaskStatus::Stopped => {
                info!(service = %service, from = %from, to = %to, "{msg}")
            }
            _ => debug!(service = %service, from = %from, to = %to, "{msg}"),
        },
        RunnerEvent::ServiceCrashed { service, reason } => {
            warn!(service = %service, reason = %reason, "{msg}")
        }

        // teardown
        RunnerEvent::TeardownStarted { session } => info!(session = %session, "{msg}"),
        RunnerEvent::TeardownFinished { session, errors } if errors.is_empty() => {
            info!(session = %session, "{msg}")
        }
        RunnerEvent::TeardownFinished { session, errors } => {
            warn!(session = %session, errors = errors.len(), first = %errors[0], "{msg} with errors")
        }
    }
}

/// Observer that forwards every runner event to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LogObserver {
    pub fn new() -> Self {
        Self
    }
}

impl Observe for LogObserver {
    fn on_event(&self, event: &RunnerEvent) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
