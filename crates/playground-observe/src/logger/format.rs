use std::{fmt, str::FromStr};

use super::error::LoggerError;

const JOURNALD: bool = cfg!(all(target_os = "linux", feature = "journald"));

/// Where and how log records are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoggerFormat {
    /// Human-readable lines on stderr.
    #[default]
    Text,
    /// One JSON object per line on stderr.
    Json,
    /// Native journald entries.
    Journald,
}

impl LoggerFormat {
    const ALL: [LoggerFormat; 3] = [LoggerFormat::Text, LoggerFormat::Json, LoggerFormat::Journald];

    pub fn as_str(self) -> &'static str {
        match self {
            LoggerFormat::Text => "text",
            LoggerFormat::Json => "json",
            LoggerFormat::Journald => "journald",
        }
    }
}

impl fmt::Display for LoggerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoggerFormat {
    type Err = LoggerError;

    /// Case-insensitive; `journal` is accepted for `journald`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        let format = Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(wanted))
            .or_else(|| wanted.eq_ignore_ascii_case("journal").then_some(LoggerFormat::Journald))
            .ok_or_else(|| LoggerError::UnknownFormat(wanted.to_string()))?;

        if format == LoggerFormat::Journald && !JOURNALD {
            return Err(LoggerError::JournaldUnavailable);
        }
        Ok(format)
    }
}
