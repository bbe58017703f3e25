use std::{
    collections::HashSet,
    path::Path,
    sync::{
        Arc, OnceLock,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures_util::future::try_join_all;
use tokio::sync::{OnceCell, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use playground_engine::Engine;
use playground_model::{Manifest, Observe, ProbeKind, Service, ServiceKind, TaskInfo};

use crate::{
    config::RunnerConfig,
    container,
    context::Context,
    error::{RunnerError, RunnerResult},
    host, network,
    ordering::wait_for_dependencies,
    ports::allocate_ports,
    ready::{Requirements, wait_ready},
    session::SessionDir,
    table::TaskTable,
    teardown::teardown,
    watcher::EventWatcher,
};

fn new_session_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Drives a validated manifest to readiness and tears it down again.
///
/// ```no_run
/// # use std::{sync::Arc, time::Duration};
/// # use playground_core::{Runner, RunnerConfig};
/// # use playground_engine::DockerEngine;
/// # use playground_model::Manifest;
/// # use tokio_util::sync::CancellationToken;
/// # async fn demo(manifest: Manifest) -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Arc::new(DockerEngine::connect().await?);
/// let runner = Runner::new(manifest, engine, RunnerConfig::default())?;
/// let cancel = CancellationToken::new();
///
/// runner.run(&cancel).await?;
/// runner.wait_for_ready(Duration::from_secs(60), &cancel).await?;
/// runner.stop().await?;
/// # Ok(())
/// # }
/// ```
pub struct Runner {
    spec: Manifest,
    ctx: Arc<Context>,
    /// Topological order of service names.
    order: Vec<String>,
    requirements: Requirements,
    /// Manifest with host ports assigned, once `run` got that far.
    resolved: OnceLock<Arc<Manifest>>,
    started: AtomicBool,
    ready: AtomicBool,
    teardown: OnceCell<Result<(), Vec<String>>>,
}

impl Runner {
    /// Validate `manifest` and register every service as `pending`.
    ///
    /// The session id comes from the config, then the manifest, and is
    /// generated when both are empty.
    pub fn new(manifest: Manifest, engine: Arc<dyn Engine>, cfg: RunnerConfig) -> RunnerResult<Self> {
        manifest.validate()?;
        let order: Vec<String> = manifest
            .topological_order()?
            .into_iter()
            .map(str::to_string)
            .collect();

        let session = cfg
            .session
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| (!manifest.session.is_empty()).then(|| manifest.session.clone()))
            .unwrap_or_else(new_session_id);

        let requirements = manifest
            .services
            .iter()
            .map(|s| (s.name.clone(), s.ready_check.is_some()))
            .collect();
        let ctx = Arc::new(Context::new(
            engine,
            cfg,
            session,
            manifest.labels.clone(),
            manifest.services.iter().map(|s| s.name.as_str()),
        ));
        debug!(target: "playground.core.runner", session = %ctx.session, services = order.len(), "runner created");

        Ok(Self {
            spec: manifest,
            ctx,
            order,
            requirements,
            resolved: OnceLock::new(),
            started: AtomicBool::new(false),
            ready: AtomicBool::new(false),
            teardown: OnceCell::new(),
        })
    }

    pub fn session(&self) -> &str {
        &self.ctx.session
    }

    /// Register an observer for lifecycle events.
    pub fn subscribe(&self, observer: Arc<dyn Observe>) {
        self.ctx.observers.add(observer);
    }

    pub fn table(&self) -> Arc<TaskTable> {
        self.ctx.table.clone()
    }

    /// Current state of every service, sorted by name.
    pub fn tasks(&self) -> Vec<TaskInfo> {
        self.ctx.table.snapshot()
    }

    /// Manifest with host port assignments; available once `run` allocated ports.
    pub fn manifest(&self) -> Option<Arc<Manifest>> {
        self.resolved.get().cloned()
    }

    pub fn session_dir(&self) -> Option<&Path> {
        self.ctx.dir.get().map(SessionDir::path)
    }

    /// Bring the whole graph up: allocate ports, ensure images, create the
    /// network and launch every service once its dependencies are met.
    ///
    /// Returns when every service has been launched. On any error, and on
    /// cancellation, everything started so far is torn down before the
    /// error is returned.
    pub async fn run(&self, cancel: &CancellationToken) -> RunnerResult<()> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(RunnerError::AlreadyStarted);
        }
        if self.teardown.initialized() || self.ctx.shutdown.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        let shutdown = self.ctx.shutdown.clone();
        let caller = cancel.clone();
        self.ctx.tracker.spawn(async move {
            tokio::select! {
                _ = caller.cancelled() => shutdown.cancel(),
                _ = shutdown.cancelled() => {}
            }
        });

        let res = tokio::select! {
            biased;
            _ = self.ctx.shutdown.cancelled() => Err(RunnerError::Cancelled),
            res = self.bring_up() => res,
        };

        if let Err(e) = &res {
            warn!(target: "playground.core.runner", session = %self.ctx.session, error = %e, "bring-up failed; tearing down");
            if let Err(td) = self.stop().await {
                warn!(target: "playground.core.runner", error = %td, "teardown after failed bring-up was incomplete");
            }
        }
        res
    }

    async fn bring_up(&self) -> RunnerResult<()> {
        let ctx = &self.ctx;

        let mut manifest = self.spec.clone();
        manifest.session = ctx.session.clone();
        allocate_ports(&mut manifest, ctx.cfg.bind_ip)?;

        let dir = SessionDir::create(&ctx.cfg.base_dir, &ctx.session).await?;
        dir.write_manifest(&manifest).await?;
        info!(target: "playground.core.runner", session = %ctx.session, dir = %dir.path().display(), services = manifest.services.len(), "session prepared");
        let _ = ctx.dir.set(dir);
        let manifest = Arc::new(manifest);
        let _ = self.resolved.set(manifest.clone());

        self.ensure_images(&manifest).await?;

        if manifest.services.iter().any(Service::is_container) {
            let name = ctx.cfg.network_name(&ctx.session);
            network::create_network(ctx.engine.as_ref(), &name, &ctx.session).await?;
            let _ = ctx.network.set(name);
        }

        let probed: HashSet<String> = manifest
            .services
            .iter()
            .filter(|s| s.ready_check.is_some())
            .map(|s| s.name.clone())
            .collect();
        EventWatcher::new(ctx.clone(), probed).spawn();

        let (tx, mut rx) = mpsc::unbounded_channel();
        for name in &self.order {
            let Some(svc) = manifest.service(name).cloned() else {
                continue;
            };
            let task_ctx = ctx.clone();
            let tx = tx.clone();
            ctx.launches.spawn(async move {
                let res = tokio::select! {
                    biased;
                    _ = task_ctx.shutdown.cancelled() => Err(RunnerError::Cancelled),
                    res = launch_service(&task_ctx, &svc) => res,
                };
                if let Err(e) = &res
                    && *e != RunnerError::Cancelled
                {
                    task_ctx.table.fail(&svc.name, e.to_string());
                }
                let _ = tx.send(res);
            });
        }
        drop(tx);

        while let Some(res) = rx.recv().await {
            res?;
        }
        info!(target: "playground.core.runner", session = %ctx.session, "all services launched");
        Ok(())
    }

    /// Pull every image in parallel; services sharing an image share one pull.
    async fn ensure_images(&self, manifest: &Manifest) -> RunnerResult<()> {
        let ctx = &self.ctx;
        let per_service = manifest.services.iter().filter_map(|svc| {
            let image = svc.image_ref()?;
            Some(async move {
                ctx.puller
                    .ensure_for(&svc.name, &image, &ctx.table, &ctx.observers)
                    .await
            })
        });

        let needs_healthmon = manifest.services.iter().any(|s| {
            s.is_container()
                && s.ready_check
                    .as_ref()
                    .and_then(|c| c.probe().ok())
                    .is_some_and(|p| !matches!(p, ProbeKind::Exec { .. }))
        });
        let healthmon = async {
            if needs_healthmon {
                ctx.puller.ensure(&ctx.cfg.healthmon_image).await
            } else {
                Ok(())
            }
        };

        tokio::try_join!(try_join_all(per_service), healthmon)?;
        Ok(())
    }

    /// Block until every service with a ready check is healthy and every
    /// other service has started.
    ///
    /// Safe to call concurrently; once it succeeded, later calls return
    /// immediately.
    pub async fn wait_for_ready(&self, deadline: Duration, cancel: &CancellationToken) -> RunnerResult<()> {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = self.ctx.shutdown.cancelled() => return Err(RunnerError::Cancelled),
            res = wait_ready(&self.ctx.table, &self.requirements, deadline, cancel) => res?,
        }
        if !self.ready.swap(true, Ordering::AcqRel) {
            info!(target: "playground.core.runner", session = %self.ctx.session, "all services ready");
        }
        Ok(())
    }

    /// Tear the session down. Idempotent: later and concurrent calls share
    /// the outcome of the first.
    pub async fn stop(&self) -> RunnerResult<()> {
        self.teardown
            .get_or_init(|| teardown(&self.ctx, &self.order))
            .await
            .clone()
            .map_err(RunnerError::TeardownPartial)
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        if self.teardown.initialized() {
            return;
        }
        self.ctx.shutdown.cancel();
        for handle in self.ctx.hosts.lock().unwrap_or_else(|e| e.into_inner()).values() {
            handle.request_stop();
        }
    }
}

async fn launch_service(ctx: &Arc<Context>, svc: &Service) -> RunnerResult<()> {
    wait_for_dependencies(&ctx.table, svc).await?;
    debug!(target: "playground.core.runner", service = %svc.name, kind = svc.kind.kind(), "dependencies met; launching");
    match &svc.kind {
        ServiceKind::Container { .. } => container::launch_container(ctx, svc).await,
        ServiceKind::Host { .. } => host::launch_host(ctx, svc).await,
    }
}
