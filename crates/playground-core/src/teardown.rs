use std::time::Duration;

use tracing::{debug, info, warn};

use playground_engine::{ContainerSummary, Engine, LabelFilter};
use playground_model::{LABEL_HEALTHMON, LABEL_PLAYGROUND, LABEL_SESSION, RunnerEvent, TaskHandle};

use crate::{
    context::Context,
    error::{RunnerError, RunnerResult},
    network,
};

/// Stop (and optionally remove) `containers`, collecting failures.
async fn release(
    engine: &dyn Engine,
    containers: &[ContainerSummary],
    grace: Duration,
    remove: bool,
    errors: &mut Vec<String>,
) {
    for c in containers {
        if c.is_running()
            && let Err(e) = engine.stop_container(&c.id, grace).await
            && !e.is_not_found()
        {
            errors.push(format!("stop container {}: {e}", c.id));
        }
        if remove
            && let Err(e) = engine.remove_container(&c.id).await
            && !e.is_not_found()
        {
            errors.push(format!("remove container {}: {e}", c.id));
        }
    }
}

async fn list(engine: &dyn Engine, filter: &LabelFilter, errors: &mut Vec<String>) -> Vec<ContainerSummary> {
    engine.list_containers(filter).await.unwrap_or_else(|e| {
        errors.push(format!("list containers: {e}"));
        Vec::new()
    })
}

/// Release everything the session owns, in reverse dependency order.
///
/// Never stops early: every step runs and failures are collected.
pub(crate) async fn teardown(ctx: &Context, order: &[String]) -> Result<(), Vec<String>> {
    ctx.observers.emit(RunnerEvent::TeardownStarted {
        session: ctx.session.clone(),
    });

    // watcher, probers and pending launches
    ctx.shutdown.cancel();
    ctx.launches.close();
    ctx.launches.wait().await;

    let engine = ctx.engine.as_ref();
    let grace = ctx.cfg.stop_grace;
    let remove = ctx.cfg.remove_containers;
    let session = LabelFilter::new().with_label(LABEL_SESSION, &ctx.session);
    let mut errors = Vec::new();

    let sidecars = list(engine, &session.clone().with_key(LABEL_HEALTHMON), &mut errors).await;
    for c in &sidecars {
        if let Err(e) = engine.remove_container(&c.id).await
            && !e.is_not_found()
        {
            errors.push(format!("remove healthmon {}: {e}", c.id));
        }
    }

    for name in order.iter().rev() {
        let Some(info) = ctx.table.get(name) else {
            continue;
        };
        match &info.handle {
            Some(TaskHandle::Process(pid)) => {
                let handle = ctx
                    .hosts
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .remove(name);
                if let Some(handle) = handle {
                    debug!(target: "playground.core.teardown", service = %name, pid, "stopping host service");
                    handle.stop().await;
                }
            }
            Some(TaskHandle::Container(id)) => {
                debug!(target: "playground.core.teardown", service = %name, container = %id, "stopping container");
                if info.status.is_running()
                    && let Err(e) = engine.stop_container(id, grace).await
                    && !e.is_not_found()
                {
                    errors.push(format!("stop {name}: {e}"));
                }
                if remove
                    && let Err(e) = engine.remove_container(id).await
                    && !e.is_not_found()
                {
                    errors.push(format!("remove {name}: {e}"));
                }
            }
            None => {}
        }
        ctx.table.stop(name, None);
    }

    // anything created out of band or missed above
    let leftovers = list(engine, &session, &mut errors).await;
    if !leftovers.is_empty() {
        debug!(target: "playground.core.teardown", count = leftovers.len(), "sweeping leftover containers");
        release(engine, &leftovers, grace, remove, &mut errors).await;
    }

    if ctx.cfg.cleanup_network
        && let Some(net) = ctx.network()
        && let Err(e) = network::remove_network(engine, net).await
    {
        errors.push(format!("remove network {net}: {e}"));
    }

    // log followers and host monitors flush and close their files
    ctx.tracker.close();
    ctx.tracker.wait().await;

    if errors.is_empty() {
        info!(target: "playground.core.teardown", session = %ctx.session, "teardown complete");
    } else {
        warn!(target: "playground.core.teardown", session = %ctx.session, errors = errors.len(), "teardown incomplete");
    }
    ctx.observers.emit(RunnerEvent::TeardownFinished {
        session: ctx.session.clone(),
        errors: errors.clone(),
    });

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

/// Stop and remove every container of `session` (or of every session when
/// `None`), then their networks. Returns how many containers were released.
pub async fn clean(engine: &dyn Engine, session: Option<&str>, grace: Duration) -> RunnerResult<usize> {
    let filter = match session {
        Some(s) => LabelFilter::new().with_label(LABEL_SESSION, s),
        None => LabelFilter::new().with_key(LABEL_PLAYGROUND),
    };
    let mut errors = Vec::new();

    let mut containers = list(engine, &filter, &mut errors).await;
    // sidecars first so they never outlive their target's namespace
    containers.sort_by_key(|c| !c.labels.contains_key(LABEL_HEALTHMON));
    release(engine, &containers, grace, true, &mut errors).await;

    match engine.list_networks(&filter).await {
        Ok(nets) => {
            for net in nets {
                if let Err(e) = network::remove_network(engine, &net).await {
                    errors.push(format!("remove network {net}: {e}"));
                }
            }
        }
        Err(e) => errors.push(format!("list networks: {e}")),
    }

    info!(target: "playground.core.teardown", session = session.unwrap_or("*"), containers = containers.len(), "clean finished");
    if errors.is_empty() {
        Ok(containers.len())
    } else {
        Err(RunnerError::TeardownPartial(errors))
    }
}
