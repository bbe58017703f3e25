use thiserror::Error;

/// Manifest invariant violations, detected before any side effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("duplicate service name: {0}")]
    DuplicateService(String),
    #[error("service {service} depends on unknown service {target}")]
    MissingDependency { service: String, target: String },
    #[error("dependency cycle between services: {}", .0.join(", "))]
    DependencyCycle(Vec<String>),
    #[error("service {service} declares port {port} more than once")]
    DuplicatePort { service: String, port: String },
    #[error("host port {port} is assigned to both {first} and {second}")]
    DuplicateHostPort {
        port: u16,
        first: String,
        second: String,
    },
    #[error("service {0} has an empty image")]
    EmptyImage(String),
    #[error("service {0} has an empty executable path")]
    EmptyExecutable(String),
    #[error("service {service} has an invalid ready check: {reason}")]
    InvalidReadyCheck { service: String, reason: String },
    #[error("service name must not be empty")]
    EmptyName,
}
