use std::time::Duration;

use serde::{Deserialize, Serialize};

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Readiness probe of a service.
///
/// `test` follows the ready-check URL scheme: a single `http[s]://host:port/path`
/// entry is an HTTP probe, a single `tcp://host:port` entry a TCP probe, and
/// anything else is the argv of a command that must exit 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyCheck {
    pub test: Vec<String>,
    /// Delay between two attempts.
    #[serde(default = "default_interval", with = "crate::serde_ms", rename = "intervalMs")]
    pub interval: Duration,
    /// Upper bound of a single attempt.
    #[serde(default = "default_timeout", with = "crate::serde_ms", rename = "timeoutMs")]
    pub timeout: Duration,
    /// Grace before the first attempt.
    #[serde(default, with = "crate::serde_ms", rename = "startPeriodMs")]
    pub start_period: Duration,
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Parsed form of [`ReadyCheck::test`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeKind {
    /// GET the URL; success on status in `[200, 400)`.
    Http { url: String },
    /// Connect and close.
    Tcp { host: String, port: u16 },
    /// Run the command; success on exit code 0.
    Exec { argv: Vec<String> },
}

impl ReadyCheck {
    pub fn new<I, S>(test: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            test: test.into_iter().map(Into::into).collect(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            start_period: Duration::ZERO,
        }
    }

    /// HTTP probe against `url`.
    pub fn http(url: impl Into<String>) -> Self {
        Self::new([url.into()])
    }

    /// TCP connect probe.
    pub fn tcp(host: &str, port: u16) -> Self {
        Self::new([format!("tcp://{host}:{port}")])
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_start_period(mut self, start_period: Duration) -> Self {
        self.start_period = start_period;
        self
    }

    /// Interpret `test` according to the URL scheme.
    pub fn probe(&self) -> Result<ProbeKind, String> {
        if let [single] = self.test.as_slice() {
            let single = single.trim();
            if single.starts_with("http://") || single.starts_with("https://") {
                return Ok(ProbeKind::Http {
                    url: single.to_string(),
                });
            }
            if let Some(rest) = single.strip_prefix("tcp://") {
                let (host, port) = rest
                    .rsplit_once(':')
                    .ok_or_else(|| format!("tcp probe without port: {single}"))?;
                let port = port
                    .trim_end_matches('/')
                    .parse::<u16>()
                    .map_err(|_| format!("invalid tcp probe port: {single}"))?;
                let host = if host.is_empty() { "localhost" } else { host };
                return Ok(ProbeKind::Tcp {
                    host: host.to_string(),
                    port,
                });
            }
        }
        if self.test.is_empty() || self.test[0].trim().is_empty() {
            return Err("empty probe command".to_string());
        }
        Ok(ProbeKind::Exec {
            argv: self.test.clone(),
        })
    }
}
