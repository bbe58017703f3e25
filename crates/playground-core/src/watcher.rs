use std::{collections::HashSet, sync::Arc};

use futures_util::StreamExt;
use tracing::{debug, info, trace, warn};

use playground_engine::{ContainerAction, ContainerSummary, EngineEvent, LabelFilter};
use playground_model::{LABEL_HEALTHMON, LABEL_SERVICE, LABEL_SESSION, RunnerEvent, TaskStatus};

use crate::context::Context;

/// Drives task transitions from container engine events.
///
/// Rules:
/// - service container started: `started` (and `healthy` without a probe);
/// - healthmon exited 0: its service becomes `healthy`;
/// - service container died before `healthy`: `failed`;
/// - service container died after `healthy`: `stopped`, reported as a crash.
///
/// Only containers this run launched count: the service container whose ID
/// the table records as the task handle, and the healthmon recorded in the
/// context. Anything else carrying the session labels (leftovers of an
/// earlier run, a stale container being replaced) is ignored.
///
/// After every (re)connect, and periodically, the watcher lists the
/// session's containers and replays the same rules on their current state
/// to cover events missed while disconnected.
pub(crate) struct EventWatcher {
    ctx: Arc<Context>,
    /// Services that declare a ready check.
    probed: HashSet<String>,
}

impl EventWatcher {
    pub(crate) fn new(ctx: Arc<Context>, probed: HashSet<String>) -> Self {
        Self { ctx, probed }
    }

    fn filter(&self) -> LabelFilter {
        LabelFilter::new().with_label(LABEL_SESSION, &self.ctx.session)
    }

    pub(crate) fn spawn(self) {
        let tracker = self.ctx.tracker.clone();
        tracker.spawn(self.run());
    }

    async fn run(self) {
        let shutdown = self.ctx.shutdown.clone();
        let mut attempt: u32 = 0;

        loop {
            let mut stream = self.ctx.engine.events(&self.filter());
            // Subscribe first, then catch up, so nothing falls in between.
            self.reconcile().await;

            let mut sweep = tokio::time::interval(self.ctx.cfg.reconcile_interval);
            sweep.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        debug!(target: "playground.core.watcher", "event watcher stopped");
                        return;
                    }
                    event = stream.next() => match event {
                        Some(Ok(event)) => {
                            attempt = 0;
                            self.apply(&event);
                        }
                        Some(Err(e)) => {
                            warn!(target: "playground.core.watcher", error = %e, "event stream failed");
                            break;
                        }
                        None => {
                            debug!(target: "playground.core.watcher", "event stream closed");
                            break;
                        }
                    },
                    _ = sweep.tick() => self.reconcile().await,
                }
            }

            let delay = self.ctx.cfg.reconnect.next(attempt);
            attempt = attempt.saturating_add(1);
            info!(target: "playground.core.watcher", attempt, delay_ms = delay.as_millis() as u64, "reconnecting to event stream");
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn apply(&self, event: &EngineEvent) {
        trace!(target: "playground.core.watcher", container = %event.container_id, action = ?event.action, "engine event");
        let id = event.container_id.as_str();
        if let Some(service) = event.labels.get(LABEL_HEALTHMON) {
            if event.action == (ContainerAction::Die { exit_code: 0 }) && self.ctx.owns_sidecar(service, id) {
                self.healthy(service);
            }
            return;
        }
        let Some(service) = event.labels.get(LABEL_SERVICE) else {
            return;
        };
        if !self.ctx.owns_container(service, id) {
            trace!(target: "playground.core.watcher", service = %service, container = id, "ignoring foreign container");
            return;
        }
        match event.action {
            ContainerAction::Start => self.started(service),
            ContainerAction::Die { exit_code } => self.died(service, exit_code),
            ContainerAction::Other(_) => {}
        }
    }

    fn started(&self, service: &str) {
        self.ctx.table.update(service, TaskStatus::Started);
        if !self.probed.contains(service) {
            self.ctx.table.update(service, TaskStatus::Healthy);
        }
    }

    fn healthy(&self, service: &str) {
        if self.ctx.table.update(service, TaskStatus::Healthy) {
            info!(target: "playground.core.watcher", service, "service is healthy");
        }
    }

    fn died(&self, service: &str, exit_code: i64) {
        let table = &self.ctx.table;
        match table.status(service) {
            Some(TaskStatus::Healthy) => {
                let reason = format!("exited with code {exit_code}");
                if table.stop(service, Some(format!("crashed: {reason}"))) {
                    warn!(target: "playground.core.watcher", service, exit_code, "service container exited after becoming healthy");
                    self.ctx.observers.emit(RunnerEvent::ServiceCrashed {
                        service: service.to_string(),
                        reason,
                    });
                }
            }
            Some(status) if !status.is_terminal() => {
                table.fail(service, format!("exited with code {exit_code} before becoming healthy"));
            }
            _ => {}
        }
    }

    fn reconcile_one(&self, c: &ContainerSummary) {
        if let Some(service) = c.labels.get(LABEL_HEALTHMON) {
            if c.has_exited() && c.exit_code == Some(0) && self.ctx.owns_sidecar(service, &c.id) {
                self.healthy(service);
            }
            return;
        }
        let Some(service) = c.labels.get(LABEL_SERVICE) else {
            return;
        };
        if !self.ctx.owns_container(service, &c.id) {
            return;
        }
        if c.is_running() {
            self.started(service);
        } else if c.has_exited() {
            self.died(service, c.exit_code.unwrap_or(-1));
        }
    }

    async fn reconcile(&self) {
        match self.ctx.engine.list_containers(&self.filter()).await {
            Ok(list) => {
                trace!(target: "playground.core.watcher", containers = list.len(), "reconciling");
                list.iter().for_each(|c| self.reconcile_one(c));
            }
            Err(e) => warn!(target: "playground.core.watcher", error = %e, "reconcile failed"),
        }
    }
}
