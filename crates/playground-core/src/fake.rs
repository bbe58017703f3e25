//! Scriptable in-memory [`Engine`] for tests.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use playground_engine::{
    ContainerAction, ContainerSpec, ContainerSummary, Engine, EngineError, EngineEvent,
    EngineResult, EventStream, LabelFilter, LogStream, NetworkSpec, PublishedPort,
};
use playground_model::LABEL_HEALTHMON;

#[derive(Debug, Clone)]
pub(crate) struct FakeContainer {
    pub id: String,
    pub spec: ContainerSpec,
    pub state: String,
    pub exit_code: Option<i64>,
}

#[derive(Default)]
struct State {
    images: HashSet<String>,
    failing_images: HashSet<String>,
    pulls: Vec<String>,
    containers: BTreeMap<String, FakeContainer>,
    networks: BTreeMap<String, HashMap<String, String>>,
    calls: Vec<String>,
    next_id: u64,
}

pub(crate) struct FakeEngine {
    state: Mutex<State>,
    events: broadcast::Sender<EngineEvent>,
    /// Cancelled to end every open event stream.
    disconnect: Mutex<CancellationToken>,
    subscriptions: AtomicUsize,
    pull_delay: Duration,
    /// Exit code healthmon sidecars report right after starting.
    healthmon_exit: Option<i64>,
}

impl FakeEngine {
    pub(crate) fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            state: Mutex::new(State::default()),
            events,
            disconnect: Mutex::new(CancellationToken::new()),
            subscriptions: AtomicUsize::new(0),
            pull_delay: Duration::from_millis(50),
            healthmon_exit: Some(0),
        }
    }

    pub(crate) fn with_image(self, image: &str) -> Self {
        self.state.lock().unwrap().images.insert(image.to_string());
        self
    }

    pub(crate) fn with_failing_image(self, image: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_images
            .insert(image.to_string());
        self
    }

    /// Sidecars never finish; services with a probe stay `started`.
    pub(crate) fn with_stuck_healthmon(mut self) -> Self {
        self.healthmon_exit = None;
        self
    }

    pub(crate) fn pulls(&self) -> Vec<String> {
        self.state.lock().unwrap().pulls.clone()
    }

    /// Operation log: `create:<name>`, `start:<name>`, `stop:<name>`, `remove:<name>`.
    pub(crate) fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub(crate) fn containers(&self) -> Vec<FakeContainer> {
        self.state.lock().unwrap().containers.values().cloned().collect()
    }

    pub(crate) fn container(&self, name: &str) -> Option<FakeContainer> {
        self.containers().into_iter().find(|c| c.spec.name == name)
    }

    pub(crate) fn networks(&self) -> Vec<String> {
        self.state.lock().unwrap().networks.keys().cloned().collect()
    }

    /// End every open event stream, as a daemon restart would.
    pub(crate) fn drop_event_streams(&self) {
        let old = std::mem::replace(&mut *self.disconnect.lock().unwrap(), CancellationToken::new());
        old.cancel();
    }

    /// How many event streams were opened so far.
    pub(crate) fn event_subscriptions(&self) -> usize {
        self.subscriptions.load(Ordering::SeqCst)
    }

    /// Insert a running container directly, bypassing create/start.
    pub(crate) fn add_running(&self, spec: ContainerSpec) -> String {
        let mut st = self.state.lock().unwrap();
        st.next_id += 1;
        let id = format!("c{:04}", st.next_id);
        st.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                spec,
                state: "running".into(),
                exit_code: None,
            },
        );
        id
    }

    /// Make the container named `name` exit with `code`.
    pub(crate) fn exit(&self, name: &str, code: i64) {
        let ev = {
            let mut st = self.state.lock().unwrap();
            let Some(c) = st.containers.values_mut().find(|c| c.spec.name == name) else {
                return;
            };
            c.state = "exited".into();
            c.exit_code = Some(code);
            EngineEvent {
                container_id: c.id.clone(),
                action: ContainerAction::Die { exit_code: code },
                labels: c.spec.labels.clone(),
            }
        };
        let _ = self.events.send(ev);
    }

    fn find_id(st: &State, id_or_name: &str) -> Option<String> {
        if st.containers.contains_key(id_or_name) {
            return Some(id_or_name.to_string());
        }
        st.containers
            .values()
            .find(|c| c.spec.name == id_or_name)
            .map(|c| c.id.clone())
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn image_exists(&self, image: &str) -> EngineResult<bool> {
        Ok(self.state.lock().unwrap().images.contains(image))
    }

    async fn pull_image(&self, image: &str, _platform: Option<&str>) -> EngineResult<()> {
        self.state.lock().unwrap().pulls.push(image.to_string());
        tokio::time::sleep(self.pull_delay).await;
        let mut st = self.state.lock().unwrap();
        if st.failing_images.contains(image) {
            return Err(EngineError::Api {
                status: 500,
                message: format!("manifest for {image} not found"),
            });
        }
        st.images.insert(image.to_string());
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        let mut st = self.state.lock().unwrap();
        if st.containers.values().any(|c| c.spec.name == spec.name) {
            return Err(EngineError::Conflict(format!("name {} in use", spec.name)));
        }
        st.next_id += 1;
        let id = format!("c{:04}", st.next_id);
        st.calls.push(format!("create:{}", spec.name));
        st.containers.insert(
            id.clone(),
            FakeContainer {
                id: id.clone(),
                spec: spec.clone(),
                state: "created".into(),
                exit_code: None,
            },
        );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        let (labels, name) = {
            let mut st = self.state.lock().unwrap();
            let c = st
                .containers
                .get_mut(id)
                .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            c.state = "running".into();
            let out = (c.spec.labels.clone(), c.spec.name.clone());
            st.calls.push(format!("start:{}", out.1));
            out
        };
        let _ = self.events.send(EngineEvent {
            container_id: id.to_string(),
            action: ContainerAction::Start,
            labels: labels.clone(),
        });
        if labels.contains_key(LABEL_HEALTHMON)
            && let Some(code) = self.healthmon_exit
        {
            self.exit(&name, code);
        }
        Ok(())
    }

    async fn stop_container(&self, id: &str, _grace: Duration) -> EngineResult<()> {
        let ev = {
            let mut st = self.state.lock().unwrap();
            let id = Self::find_id(&st, id).ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            let c = st.containers.get_mut(&id).expect("container exists");
            let name = c.spec.name.clone();
            let ev = (c.state == "running").then(|| {
                c.state = "exited".into();
                c.exit_code = Some(143);
                EngineEvent {
                    container_id: id.clone(),
                    action: ContainerAction::Die { exit_code: 143 },
                    labels: c.spec.labels.clone(),
                }
            });
            st.calls.push(format!("stop:{name}"));
            ev
        };
        if let Some(ev) = ev {
            let _ = self.events.send(ev);
        }
        Ok(())
    }

    /// Force removal: a running container dies first, with its event.
    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        let ev = {
            let mut st = self.state.lock().unwrap();
            let id = Self::find_id(&st, id).ok_or_else(|| EngineError::NotFound(id.to_string()))?;
            let Some(c) = st.containers.remove(&id) else {
                return Ok(());
            };
            st.calls.push(format!("remove:{}", c.spec.name));
            (c.state == "running").then(|| EngineEvent {
                container_id: c.id.clone(),
                action: ContainerAction::Die { exit_code: 137 },
                labels: c.spec.labels.clone(),
            })
        };
        if let Some(ev) = ev {
            let _ = self.events.send(ev);
        }
        Ok(())
    }

    async fn list_containers(&self, filter: &LabelFilter) -> EngineResult<Vec<ContainerSummary>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .containers
            .values()
            .filter(|c| filter.matches(&c.spec.labels))
            .map(|c| ContainerSummary {
                id: c.id.clone(),
                labels: c.spec.labels.clone(),
                state: c.state.clone(),
                exit_code: c.exit_code,
                ports: c
                    .spec
                    .ports
                    .iter()
                    .map(|p| PublishedPort {
                        private_port: p.container_port,
                        public_port: Some(p.host_port),
                        protocol: p.protocol.clone(),
                    })
                    .collect(),
            })
            .collect())
    }

    fn container_logs(&self, id: &str) -> LogStream {
        let line = format!("2026-01-01T00:00:00Z {id} listening\n").into_bytes();
        stream::iter(vec![Ok(line)]).boxed()
    }

    fn events(&self, filter: &LabelFilter) -> EventStream {
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        let rx = self.events.subscribe();
        let closed = self.disconnect.lock().unwrap().clone();
        let filter = filter.clone();
        stream::unfold((rx, filter), |(mut rx, filter)| async move {
            loop {
                match rx.recv().await {
                    Ok(ev) if filter.matches(&ev.labels) => return Some((Ok(ev), (rx, filter))),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .take_until(closed.cancelled_owned())
        .boxed()
    }

    async fn create_network(&self, spec: &NetworkSpec) -> EngineResult<String> {
        let mut st = self.state.lock().unwrap();
        if st.networks.contains_key(&spec.name) {
            return Err(EngineError::Conflict(format!("network {} exists", spec.name)));
        }
        st.networks.insert(spec.name.clone(), spec.labels.clone());
        Ok(spec.name.clone())
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        self.state
            .lock()
            .unwrap()
            .networks
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::NotFound(name.to_string()))
    }

    async fn list_networks(&self, filter: &LabelFilter) -> EngineResult<Vec<String>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .networks
            .iter()
            .filter(|(_, labels)| filter.matches(labels))
            .map(|(name, _)| name.clone())
            .collect())
    }
}
