use thiserror::Error;

use playground_engine::EngineError;
use playground_model::ValidationError;

pub type RunnerResult<T> = Result<T, RunnerError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("invalid manifest: {0}")]
    Validation(#[from] ValidationError),
    #[error("host port {port} of {service}/{name} is already in use")]
    PortInUse {
        service: String,
        name: String,
        port: u16,
    },
    #[error("failed to pull image {image}: {reason}")]
    PullFailed { image: String, reason: String },
    #[error("failed to create network {network}: {reason}")]
    NetworkCreateFailed { network: String, reason: String },
    #[error("failed to launch service {service}: {reason}")]
    LaunchFailed { service: String, reason: String },
    #[error("service {service} failed: {reason}")]
    ServiceFailed { service: String, reason: String },
    #[error("deadline exceeded; not ready: {}", .pending.join(", "))]
    DeadlineExceeded { pending: Vec<String> },
    #[error("cancelled")]
    Cancelled,
    #[error("teardown finished with {} error(s): {}", .0.len(), .0.join("; "))]
    TeardownPartial(Vec<String>),
    #[error("session directory {path}: {reason}")]
    Session { path: String, reason: String },
    #[error("runner already started")]
    AlreadyStarted,
}

impl RunnerError {
    pub(crate) fn launch(service: &str, reason: impl ToString) -> Self {
        RunnerError::LaunchFailed {
            service: service.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Errors of the port lookup used by the CLI.
#[derive(Debug, Error)]
pub enum PortQueryError {
    #[error("no playground session is running")]
    NoSession,
    #[error("more than one session is running, pick one of: {}", .0.join(", "))]
    AmbiguousSession(Vec<String>),
    #[error("service {service} not found in session {session}")]
    ServiceNotFound { session: String, service: String },
    #[error("port {port} not found for service {service}; available: {}", .available.join(", "))]
    PortNotFound {
        service: String,
        port: String,
        available: Vec<String>,
    },
    #[error("port {port} of service {service} is not published on the host")]
    NotPublished { service: String, port: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
}
