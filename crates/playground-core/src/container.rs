use std::sync::Arc;

use tracing::{debug, info, warn};

use playground_engine::{ContainerSpec, EngineError, PortMapping};
use playground_model::{
    LABEL_COMPOSE_SERVICE, LABEL_SERVICE, Service, ServiceKind, TaskHandle, TaskStatus, port_label,
};

use crate::{
    context::Context,
    error::{RunnerError, RunnerResult},
    logs, sidecar,
    session::SessionDir,
};

/// Engine request for a container service.
pub(crate) fn container_spec(ctx: &Context, svc: &Service, dir: &SessionDir) -> RunnerResult<ContainerSpec> {
    let ServiceKind::Container {
        entrypoint,
        args,
        volumes,
        ..
    } = &svc.kind
    else {
        return Err(RunnerError::launch(&svc.name, "not a container service"));
    };
    let image = svc
        .image_ref()
        .ok_or_else(|| RunnerError::launch(&svc.name, "no image"))?;

    let mut labels = ctx.base_labels();
    labels.extend(svc.labels.iter().map(|(k, v)| (k.clone(), v.clone())));
    labels.insert(LABEL_SERVICE.to_string(), svc.name.clone());
    labels.insert(LABEL_COMPOSE_SERVICE.to_string(), svc.name.clone());

    let mut ports = Vec::with_capacity(svc.ports.len());
    for port in &svc.ports {
        labels.insert(port_label(&port.name), port.container_port.to_string());
        let host_port = port.host_port.ok_or_else(|| {
            RunnerError::launch(&svc.name, format!("port {} has no host assignment", port.name))
        })?;
        ports.push(PortMapping {
            container_port: port.container_port,
            protocol: port.protocol.as_str().to_string(),
            host_ip: ctx.cfg.bind_ip.to_string(),
            host_port,
        });
    }

    let binds = volumes
        .iter()
        .map(|v| {
            let ro = if v.read_only { ":ro" } else { "" };
            format!("{}:{}{ro}", dir.resolve(&v.host).display(), v.container)
        })
        .collect();

    Ok(ContainerSpec {
        name: ctx.container_name(&svc.name),
        image,
        entrypoint: entrypoint.clone(),
        cmd: args.clone(),
        env: ctx.cfg.base_env.merged(&svc.env).to_engine_vars(),
        labels,
        binds,
        ports,
        network_mode: ctx.network().map(str::to_string),
        network_aliases: vec![svc.name.clone()],
        working_dir: svc.working_dir.clone(),
    })
}

/// Create the container, retrying once after removing a stale one of the same name.
pub(crate) async fn create(ctx: &Context, svc: &Service, spec: &ContainerSpec) -> RunnerResult<String> {
    match ctx.engine.create_container(spec).await {
        Ok(id) => Ok(id),
        Err(EngineError::Conflict(reason)) => {
            warn!(target: "playground.core.container", service = %svc.name, %reason, "removing stale container");
            ctx.engine
                .remove_container(&spec.name)
                .await
                .map_err(|e| RunnerError::launch(&svc.name, e))?;
            ctx.engine
                .create_container(spec)
                .await
                .map_err(|e| RunnerError::launch(&svc.name, e))
        }
        Err(e) => Err(RunnerError::launch(&svc.name, e)),
    }
}

/// Create and start a container service, then attach its log follower and
/// readiness sidecar.
pub(crate) async fn launch_container(ctx: &Arc<Context>, svc: &Service) -> RunnerResult<()> {
    let dir = ctx.dir()?;
    let spec = container_spec(ctx, svc, dir)?;

    let id = create(ctx, svc, &spec).await?;
    ctx.table.set_handle(&svc.name, TaskHandle::Container(id.clone()));
    debug!(target: "playground.core.container", service = %svc.name, container = %id, "container created");

    ctx.engine
        .start_container(&id)
        .await
        .map_err(|e| RunnerError::launch(&svc.name, e))?;
    logs::follow_container(ctx, &svc.name, &id, dir.log_path(&svc.name));

    ctx.table.update(&svc.name, TaskStatus::Started);
    info!(target: "playground.core.container", service = %svc.name, container = %id, image = %spec.image, "container started");

    match &svc.ready_check {
        None => {
            ctx.table.update(&svc.name, TaskStatus::Healthy);
            Ok(())
        }
        Some(check) => sidecar::launch_healthmon(ctx, svc, &id, check).await,
    }
}
