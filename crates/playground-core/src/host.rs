use std::{process::Stdio, sync::Arc, time::Duration};

use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playground_model::{RunnerEvent, Service, ServiceKind, TaskHandle, TaskStatus};

use crate::{
    context::Context,
    error::{RunnerError, RunnerResult},
    logs, probe,
};

/// Control handle of a running host process.
#[derive(Clone)]
pub(crate) struct HostHandle {
    pub pid: u32,
    stop: CancellationToken,
    done: CancellationToken,
}

impl HostHandle {
    pub(crate) fn request_stop(&self) {
        self.stop.cancel();
    }

    /// Terminate the process (SIGTERM, then SIGKILL after the grace) and
    /// wait for its monitor to finish.
    pub(crate) async fn stop(&self) {
        self.stop.cancel();
        self.done.cancelled().await;
    }
}

#[cfg(unix)]
async fn terminate(child: &mut Child, grace: Duration) {
    if let Some(pid) = child.id().and_then(|p| libc::pid_t::try_from(p).ok()) {
        // SAFETY: signalling a child process we spawned and have not reaped.
        unsafe {
            libc::kill(pid, libc::SIGTERM);
        }
        if tokio::time::timeout(grace, child.wait()).await.is_ok() {
            return;
        }
        debug!(target: "playground.core.host", pid, "grace elapsed; killing");
    }
    let _ = child.kill().await;
}

#[cfg(not(unix))]
async fn terminate(child: &mut Child, _grace: Duration) {
    let _ = child.kill().await;
}

/// Apply the exit rules: before `healthy` the service failed, after it the
/// service crashed and is reported as stopped. No restart either way.
fn on_exit(ctx: &Context, name: &str, reason: String) {
    match ctx.table.status(name) {
        Some(TaskStatus::Healthy) => {
            if ctx.table.stop(name, Some(format!("crashed: {reason}"))) {
                warn!(target: "playground.core.host", service = name, %reason, "host service crashed");
                ctx.observers.emit(RunnerEvent::ServiceCrashed {
                    service: name.to_string(),
                    reason,
                });
            }
        }
        Some(status) if !status.is_terminal() => {
            ctx.table
                .fail(name, format!("exited before becoming healthy: {reason}"));
        }
        _ => {}
    }
}

fn monitor(ctx: &Arc<Context>, name: String, mut child: Child, stop: CancellationToken, done: CancellationToken) {
    let ctx_task = ctx.clone();
    ctx.tracker.spawn(async move {
        let ctx = ctx_task;
        tokio::select! {
            status = child.wait() => {
                let reason = match status {
                    Ok(s) => s.to_string(),
                    Err(e) => format!("wait: {e}"),
                };
                on_exit(&ctx, &name, reason);
            }
            _ = stop.cancelled() => {
                terminate(&mut child, ctx.cfg.host_grace).await;
                ctx.table.stop(&name, None);
                debug!(target: "playground.core.host", service = %name, "host service stopped");
            }
        }
        done.cancel();
    });
}

/// Spawn a host service, wire its stdio to the session log and start the
/// monitor (and prober, if the service declares a ready check).
pub(crate) async fn launch_host(ctx: &Arc<Context>, svc: &Service) -> RunnerResult<()> {
    let ServiceKind::Host { path, args } = &svc.kind else {
        return Err(RunnerError::launch(&svc.name, "not a host service"));
    };
    let dir = ctx.dir()?;

    let mut cmd = Command::new(path);
    cmd.args(args)
        .envs(ctx.cfg.base_env.merged(&svc.env).resolved())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(wd) = &svc.working_dir {
        cmd.current_dir(dir.resolve(wd));
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| RunnerError::launch(&svc.name, format!("spawn {path}: {e}")))?;
    let pid = child.id().unwrap_or_default();
    ctx.table.set_handle(&svc.name, TaskHandle::Process(pid));

    match logs::open_log(&dir.log_path(&svc.name)).await {
        Ok(out) => {
            let err = out.try_clone().await;
            if let Some(stdout) = child.stdout.take() {
                logs::pipe(ctx, &svc.name, stdout, out);
            }
            match (child.stderr.take(), err) {
                (Some(stderr), Ok(err)) => logs::pipe(ctx, &svc.name, stderr, err),
                (_, Err(e)) => {
                    warn!(target: "playground.core.host", service = %svc.name, error = %e, "stderr not logged")
                }
                _ => {}
            }
        }
        Err(e) => warn!(target: "playground.core.host", service = %svc.name, error = %e, "cannot open log file"),
    }

    ctx.table.update(&svc.name, TaskStatus::Started);
    info!(target: "playground.core.host", service = %svc.name, pid, program = %path, "host service started");

    let handle = HostHandle {
        pid,
        stop: CancellationToken::new(),
        done: CancellationToken::new(),
    };
    monitor(ctx, svc.name.clone(), child, handle.stop.clone(), handle.done.clone());
    ctx.hosts
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(svc.name.clone(), handle);

    match &svc.ready_check {
        None => {
            ctx.table.update(&svc.name, TaskStatus::Healthy);
        }
        Some(check) => probe::spawn_prober(ctx, &svc.name, check.clone()),
    }
    Ok(())
}
