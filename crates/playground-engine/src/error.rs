use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("engine api error ({status}): {message}")]
    Api { status: u16, message: String },
    #[error("stream closed")]
    StreamClosed,
    #[error("engine connection error: {0}")]
    Connection(String),
}

impl EngineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<bollard::errors::Error> for EngineError {
    fn from(e: bollard::errors::Error) -> Self {
        use bollard::errors::Error as B;
        match e {
            B::DockerResponseServerError {
                status_code: 404,
                message,
            } => EngineError::NotFound(message),
            B::DockerResponseServerError {
                status_code: 409,
                message,
            } => EngineError::Conflict(message),
            B::DockerResponseServerError {
                status_code,
                message,
            } => EngineError::Api {
                status: status_code,
                message,
            },
            B::DockerStreamError { error } => EngineError::Api {
                status: 500,
                message: error,
            },
            other => EngineError::Connection(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_map_by_status() {
        let nf: EngineError = bollard::errors::Error::DockerResponseServerError {
            status_code: 404,
            message: "no such container".into(),
        }
        .into();
        assert!(nf.is_not_found());

        let conflict: EngineError = bollard::errors::Error::DockerResponseServerError {
            status_code: 409,
            message: "name in use".into(),
        }
        .into();
        assert_eq!(conflict, EngineError::Conflict("name in use".into()));

        let other: EngineError = bollard::errors::Error::DockerResponseServerError {
            status_code: 500,
            message: "boom".into(),
        }
        .into();
        assert!(matches!(other, EngineError::Api { status: 500, .. }));
        assert!(!other.is_not_found());
    }
}
