use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, OnceLock},
};

use tokio_util::{sync::CancellationToken, task::TaskTracker};

use playground_engine::Engine;
use playground_model::{LABEL_PLAYGROUND, LABEL_SESSION, SessionId, TaskHandle};

use crate::{
    config::RunnerConfig,
    error::{RunnerError, RunnerResult},
    host::HostHandle,
    images::ImagePuller,
    observers::Observers,
    session::SessionDir,
    table::TaskTable,
};

/// State shared by the runner and every task it spawns.
pub(crate) struct Context {
    pub engine: Arc<dyn Engine>,
    pub cfg: RunnerConfig,
    pub session: SessionId,
    /// Manifest-wide labels.
    pub labels: BTreeMap<String, String>,
    pub table: Arc<TaskTable>,
    pub observers: Arc<Observers>,
    pub puller: ImagePuller,
    /// Fires when the runner shuts down; every spawned task watches it.
    pub shutdown: CancellationToken,
    /// Launch tasks; teardown drains them before sweeping.
    pub launches: TaskTracker,
    /// Watcher, probers, host monitors and log followers.
    pub tracker: TaskTracker,
    pub hosts: Mutex<HashMap<String, HostHandle>>,
    /// Healthmon container ID per probed service.
    pub sidecars: Mutex<HashMap<String, String>>,
    pub dir: OnceLock<SessionDir>,
    pub network: OnceLock<String>,
}

impl Context {
    /// Fresh context with every named service `pending`.
    pub(crate) fn new<'a>(
        engine: Arc<dyn Engine>,
        cfg: RunnerConfig,
        session: SessionId,
        labels: BTreeMap<String, String>,
        services: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let observers = Arc::new(Observers::default());
        let table = Arc::new(TaskTable::new(services, observers.clone()));
        Self {
            puller: ImagePuller::new(engine.clone(), cfg.platform.clone()),
            engine,
            cfg,
            session,
            labels,
            table,
            observers,
            shutdown: CancellationToken::new(),
            launches: TaskTracker::new(),
            tracker: TaskTracker::new(),
            hosts: Mutex::default(),
            sidecars: Mutex::default(),
            dir: OnceLock::new(),
            network: OnceLock::new(),
        }
    }

    /// Labels stamped on every engine object of the session.
    pub(crate) fn base_labels(&self) -> HashMap<String, String> {
        let mut labels: HashMap<String, String> = self
            .labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        labels.insert(LABEL_PLAYGROUND.to_string(), "true".to_string());
        labels.insert(LABEL_SESSION.to_string(), self.session.clone());
        labels
    }

    pub(crate) fn dir(&self) -> RunnerResult<&SessionDir> {
        self.dir.get().ok_or_else(|| RunnerError::Session {
            path: self.cfg.base_dir.join(&self.session).display().to_string(),
            reason: "session directory not created".to_string(),
        })
    }

    pub(crate) fn network(&self) -> Option<&str> {
        self.network.get().map(String::as_str)
    }

    pub(crate) fn record_sidecar(&self, service: &str, id: &str) {
        self.sidecars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(service.to_string(), id.to_string());
    }

    /// Whether `id` is the service container this run launched for `service`.
    pub(crate) fn owns_container(&self, service: &str, id: &str) -> bool {
        matches!(
            self.table.get(service).and_then(|i| i.handle),
            Some(TaskHandle::Container(h)) if h == id
        )
    }

    /// Whether `id` is the healthmon this run launched for `service`.
    pub(crate) fn owns_sidecar(&self, service: &str, id: &str) -> bool {
        self.sidecars
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(service)
            .is_some_and(|h| h == id)
    }

    /// Container name of `service` in this session.
    pub(crate) fn container_name(&self, service: &str) -> String {
        format!("{}-{service}", self.session)
    }
}
