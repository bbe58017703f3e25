use std::{process::Stdio, sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{net::TcpStream, process::Command};
use tracing::{info, trace, warn};

use playground_model::{ProbeKind, ReadyCheck, TaskStatus};

use crate::context::Context;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProbeError {
    #[error("unexpected http status {0}")]
    Status(u16),
    #[error("http request failed: {0}")]
    Http(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("command exited with {0:?}")]
    Exit(Option<i32>),
    #[error("command spawn failed: {0}")]
    Spawn(String),
    #[error("probe timed out")]
    Timeout,
    #[error("probe client: {0}")]
    Client(String),
}

/// Runs single readiness attempts from the runner process.
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// One attempt, bounded by `timeout`.
    pub async fn check(&self, probe: &ProbeKind, timeout: Duration) -> Result<(), ProbeError> {
        tokio::time::timeout(timeout, self.attempt(probe, timeout))
            .await
            .unwrap_or(Err(ProbeError::Timeout))
    }

    async fn attempt(&self, probe: &ProbeKind, timeout: Duration) -> Result<(), ProbeError> {
        match probe {
            ProbeKind::Http { url } => {
                let resp = self
                    .client
                    .get(url)
                    .timeout(timeout)
                    .send()
                    .await
                    .map_err(|e| ProbeError::Http(e.to_string()))?;
                let status = resp.status().as_u16();
                if (200..400).contains(&status) {
                    Ok(())
                } else {
                    Err(ProbeError::Status(status))
                }
            }
            ProbeKind::Tcp { host, port } => {
                TcpStream::connect((host.as_str(), *port))
                    .await
                    .map(drop)
                    .map_err(|e| ProbeError::Connect(e.to_string()))
            }
            ProbeKind::Exec { argv } => {
                let Some((program, args)) = argv.split_first() else {
                    return Err(ProbeError::Spawn("empty command".into()));
                };
                let status = Command::new(program)
                    .args(args)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .kill_on_drop(true)
                    .status()
                    .await
                    .map_err(|e| ProbeError::Spawn(e.to_string()))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ProbeError::Exit(status.code()))
                }
            }
        }
    }
}

/// Probe host service `name` until it passes, then mark it healthy.
///
/// Stops early when the runner shuts down or the service finishes.
pub(crate) fn spawn_prober(ctx: &Arc<Context>, name: &str, check: ReadyCheck) {
    let table = ctx.table.clone();
    let shutdown = ctx.shutdown.clone();
    let name = name.to_string();

    ctx.tracker.spawn(async move {
        let probe = match check.probe() {
            Ok(p) => p,
            Err(reason) => {
                table.fail(&name, format!("invalid ready check: {reason}"));
                return;
            }
        };
        let prober = match Prober::new() {
            Ok(p) => p,
            Err(e) => {
                warn!(target: "playground.core.probe", service = %name, error = %e, "cannot build prober");
                table.fail(&name, e.to_string());
                return;
            }
        };

        if !check.start_period.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(check.start_period) => {}
            }
        }

        let mut attempt: u32 = 0;
        loop {
            if table.status(&name).is_none_or(|s| s.is_terminal()) {
                return;
            }
            attempt += 1;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return,
                res = prober.check(&probe, check.timeout) => match res {
                    Ok(()) => {
                        if table.update(&name, TaskStatus::Healthy) {
                            info!(target: "playground.core.probe", service = %name, attempt, "ready check passed");
                        }
                        return;
                    }
                    Err(e) => trace!(target: "playground.core.probe", service = %name, attempt, error = %e, "ready check failed"),
                },
            }
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(check.interval) => {}
            }
        }
    });
}
