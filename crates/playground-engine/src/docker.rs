use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use bollard::{
    Docker,
    container::{
        Config, CreateContainerOptions, ListContainersOptions, LogsOptions, NetworkingConfig,
        RemoveContainerOptions, StartContainerOptions, StopContainerOptions,
    },
    image::CreateImageOptions,
    models::{EndpointSettings, EventMessage, EventMessageTypeEnum, HostConfig, PortBinding},
    network::{CreateNetworkOptions, ListNetworksOptions},
    system::EventsOptions,
};
use futures_util::{StreamExt, TryStreamExt};
use tracing::{debug, trace};

use crate::{
    ContainerAction, ContainerSpec, ContainerSummary, Engine, EngineError, EngineEvent,
    EngineResult, EventStream, LabelFilter, LogStream, NetworkSpec, PublishedPort,
    parse_exit_code,
};

/// [`Engine`] backed by the local Docker daemon.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connect using `DOCKER_HOST` or the platform default socket and
    /// negotiate the API version with the daemon.
    pub async fn connect() -> EngineResult<Self> {
        let docker = Docker::connect_with_local_defaults()?
            .negotiate_version()
            .await?;
        debug!(target: "playground.engine", "connected to docker");
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }
}

fn label_filters(filter: &LabelFilter) -> HashMap<String, Vec<String>> {
    HashMap::from([("label".to_string(), filter.to_filters())])
}

fn container_config(spec: &ContainerSpec) -> Config<String> {
    let mut exposed_ports = HashMap::new();
    let mut port_bindings = HashMap::new();
    for port in &spec.ports {
        exposed_ports.insert(port.key(), HashMap::new());
        port_bindings.insert(
            port.key(),
            Some(vec![PortBinding {
                host_ip: Some(port.host_ip.clone()),
                host_port: Some(port.host_port.to_string()),
            }]),
        );
    }

    let networking_config = match &spec.network_mode {
        Some(net) if !net.starts_with("container:") && !spec.network_aliases.is_empty() => {
            Some(NetworkingConfig {
                endpoints_config: HashMap::from([(
                    net.clone(),
                    EndpointSettings {
                        aliases: Some(spec.network_aliases.clone()),
                        ..Default::default()
                    },
                )]),
            })
        }
        _ => None,
    };

    Config {
        image: Some(spec.image.clone()),
        entrypoint: spec.entrypoint.clone(),
        cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
        env: (!spec.env.is_empty()).then(|| spec.env.clone()),
        labels: Some(spec.labels.clone()),
        working_dir: spec.working_dir.clone(),
        exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
        host_config: Some(HostConfig {
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            network_mode: spec.network_mode.clone(),
            ..Default::default()
        }),
        networking_config,
        ..Default::default()
    }
}

fn to_engine_event(msg: EventMessage) -> Option<EngineEvent> {
    if msg.typ != Some(EventMessageTypeEnum::CONTAINER) {
        return None;
    }
    let actor = msg.actor?;
    let container_id = actor.id?;
    let labels = actor.attributes.unwrap_or_default();
    let action = match msg.action.as_deref() {
        Some("start") => ContainerAction::Start,
        Some("die") => ContainerAction::Die {
            exit_code: labels
                .get("exitCode")
                .and_then(|c| c.parse().ok())
                .unwrap_or(-1),
        },
        Some(other) => ContainerAction::Other(other.to_string()),
        None => return None,
    };
    Some(EngineEvent {
        container_id,
        action,
        labels,
    })
}

#[async_trait]
impl Engine for DockerEngine {
    async fn image_exists(&self, image: &str) -> EngineResult<bool> {
        match self.docker.inspect_image(image).await {
            Ok(_) => Ok(true),
            Err(e) => match EngineError::from(e) {
                EngineError::NotFound(_) => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn pull_image(&self, image: &str, platform: Option<&str>) -> EngineResult<()> {
        let opts = CreateImageOptions::<String> {
            from_image: image.to_string(),
            platform: platform.unwrap_or_default().to_string(),
            ..Default::default()
        };
        let mut progress = self.docker.create_image(Some(opts), None, None);
        while let Some(info) = progress.try_next().await? {
            trace!(target: "playground.engine", image, status = ?info.status, "pull progress");
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String> {
        let opts = CreateContainerOptions {
            name: spec.name.clone(),
            platform: None,
        };
        let created = self
            .docker
            .create_container(Some(opts), container_config(spec))
            .await?;
        Ok(created.id)
    }

    async fn start_container(&self, id: &str) -> EngineResult<()> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn stop_container(&self, id: &str, grace: Duration) -> EngineResult<()> {
        let opts = StopContainerOptions {
            t: grace.as_secs() as i64,
        };
        match self.docker.stop_container(id, Some(opts)).await {
            Ok(()) => Ok(()),
            // already stopped
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 304, ..
            }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn remove_container(&self, id: &str) -> EngineResult<()> {
        let opts = RemoveContainerOptions {
            force: true,
            v: true,
            ..Default::default()
        };
        self.docker.remove_container(id, Some(opts)).await?;
        Ok(())
    }

    async fn list_containers(&self, filter: &LabelFilter) -> EngineResult<Vec<ContainerSummary>> {
        let opts = ListContainersOptions::<String> {
            all: true,
            filters: label_filters(filter),
            ..Default::default()
        };
        let list = self.docker.list_containers(Some(opts)).await?;
        Ok(list
            .into_iter()
            .map(|c| {
                let status = c.status.unwrap_or_default();
                ContainerSummary {
                    id: c.id.unwrap_or_default(),
                    labels: c.labels.unwrap_or_default(),
                    state: c.state.unwrap_or_default(),
                    exit_code: parse_exit_code(&status),
                    ports: c
                        .ports
                        .unwrap_or_default()
                        .into_iter()
                        .map(|p| PublishedPort {
                            private_port: p.private_port,
                            public_port: p.public_port,
                            protocol: p.typ.map(|t| t.to_string()).unwrap_or_else(|| "tcp".into()),
                        })
                        .collect(),
                }
            })
            .collect())
    }

    fn container_logs(&self, id: &str) -> LogStream {
        let opts = LogsOptions::<String> {
            follow: true,
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: "all".to_string(),
            ..Default::default()
        };
        self.docker
            .logs(id, Some(opts))
            .map(|chunk| chunk.map(|out| out.into_bytes().to_vec()).map_err(EngineError::from))
            .boxed()
    }

    fn events(&self, filter: &LabelFilter) -> EventStream {
        let mut filters = label_filters(filter);
        filters.insert("type".to_string(), vec!["container".to_string()]);
        let opts = EventsOptions::<String> {
            filters,
            ..Default::default()
        };
        self.docker
            .events(Some(opts))
            .filter_map(|msg| async move {
                match msg {
                    Ok(msg) => to_engine_event(msg).map(Ok),
                    Err(e) => Some(Err(EngineError::from(e))),
                }
            })
            .boxed()
    }

    async fn create_network(&self, spec: &NetworkSpec) -> EngineResult<String> {
        let opts = CreateNetworkOptions::<String> {
            name: spec.name.clone(),
            driver: "bridge".to_string(),
            labels: spec.labels.clone(),
            ..Default::default()
        };
        self.docker.create_network(opts).await?;
        Ok(spec.name.clone())
    }

    async fn remove_network(&self, name: &str) -> EngineResult<()> {
        self.docker.remove_network(name).await?;
        Ok(())
    }

    async fn list_networks(&self, filter: &LabelFilter) -> EngineResult<Vec<String>> {
        let opts = ListNetworksOptions::<String> {
            filters: label_filters(filter),
        };
        let list = self.docker.list_networks(Some(opts)).await?;
        Ok(list.into_iter().filter_map(|n| n.name).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PortMapping;

    fn spec() -> ContainerSpec {
        ContainerSpec {
            name: "s1-el".into(),
            image: "reth:latest".into(),
            cmd: vec!["node".into()],
            ports: vec![PortMapping {
                container_port: 8545,
                protocol: "tcp".into(),
                host_ip: "127.0.0.1".into(),
                host_port: 34567,
            }],
            network_mode: Some("playground-s1".into()),
            network_aliases: vec!["el".into()],
            ..Default::default()
        }
    }

    #[test]
    fn config_publishes_ports_on_bind_ip() {
        let cfg = container_config(&spec());
        assert!(cfg.exposed_ports.unwrap().contains_key("8545/tcp"));

        let host = cfg.host_config.unwrap();
        let binding = host.port_bindings.unwrap()["8545/tcp"].clone().unwrap();
        assert_eq!(binding[0].host_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(binding[0].host_port.as_deref(), Some("34567"));
        assert_eq!(host.network_mode.as_deref(), Some("playground-s1"));
    }

    #[test]
    fn config_attaches_aliases_on_named_network_only() {
        let cfg = container_config(&spec());
        let endpoints = cfg.networking_config.unwrap().endpoints_config;
        assert_eq!(endpoints["playground-s1"].aliases, Some(vec!["el".to_string()]));

        let mut sidecar = spec();
        sidecar.network_mode = Some("container:abc".into());
        sidecar.ports.clear();
        let cfg = container_config(&sidecar);
        assert!(cfg.networking_config.is_none());
        assert!(cfg.exposed_ports.is_none());
    }

    #[test]
    fn die_event_carries_exit_code_and_labels() {
        let msg = EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("die".into()),
            actor: Some(bollard::models::EventActor {
                id: Some("abc".into()),
                attributes: Some(HashMap::from([
                    ("exitCode".to_string(), "0".to_string()),
                    ("playground.healthmon".to_string(), "el".to_string()),
                ])),
            }),
            ..Default::default()
        };
        let ev = to_engine_event(msg).unwrap();
        assert_eq!(ev.container_id, "abc");
        assert_eq!(ev.action, ContainerAction::Die { exit_code: 0 });
        assert_eq!(ev.labels["playground.healthmon"], "el");
    }

    #[test]
    fn non_container_events_are_skipped() {
        let msg = EventMessage {
            typ: Some(EventMessageTypeEnum::NETWORK),
            action: Some("create".into()),
            ..Default::default()
        };
        assert!(to_engine_event(msg).is_none());
    }
}
