use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoggerError {
    #[error("unknown log format {0:?}; expected text, json or journald")]
    UnknownFormat(String),
    #[error("journald output needs Linux and the `journald` feature")]
    JournaldUnavailable,
    #[error("invalid log filter {directive:?}: {reason}")]
    InvalidFilter { directive: String, reason: String },
    #[error("a global logger is already installed")]
    AlreadyInstalled,
    #[error("cannot connect to journald: {0}")]
    Journald(String),
    #[error("cannot install logger: {0}")]
    Install(String),
}
