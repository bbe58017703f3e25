use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::{ReadyCheck, ServiceEnv, ServiceName};

/// A named unit to launch: a container or a host process.
///
/// Substrate-specific fields live in [`ServiceKind`]; everything else is
/// shared. Services refer to each other by name only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub name: ServiceName,
    #[serde(flatten)]
    pub kind: ServiceKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "ServiceEnv::is_empty")]
    pub env: ServiceEnv,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<DependsOn>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_check: Option<ReadyCheck>,
    /// Extra labels stamped on the service's engine objects.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
}

/// Substrate of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ServiceKind {
    /// Run inside a container on the session network.
    #[serde(rename_all = "camelCase")]
    Container {
        image: String,
        #[serde(default = "default_tag")]
        tag: String,
        /// Override of the image entrypoint.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        entrypoint: Option<Vec<String>>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        volumes: Vec<VolumeMount>,
    },
    /// Spawn a child process on the host.
    #[serde(rename_all = "camelCase")]
    Host {
        path: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        args: Vec<String>,
    },
}

fn default_tag() -> String {
    "latest".to_string()
}

impl ServiceKind {
    /// Short identifier for logs: `"container"` or `"host"`.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceKind::Container { .. } => "container",
            ServiceKind::Host { .. } => "host",
        }
    }
}

/// Bind mount of a host path into a container.
///
/// Relative host paths are anchored in the session directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VolumeMount {
    pub host: String,
    pub container: String,
    #[serde(default)]
    pub read_only: bool,
}

/// Transport protocol of a port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared service port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    /// Logical name, unique within the service.
    pub name: String,
    pub container_port: u16,
    #[serde(default)]
    pub protocol: Protocol,
    /// Host port; preassigned or filled in by the port allocator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
}

impl Port {
    pub fn tcp(name: impl Into<String>, container_port: u16) -> Self {
        Self {
            name: name.into(),
            container_port,
            protocol: Protocol::Tcp,
            host_port: None,
        }
    }

    pub fn udp(name: impl Into<String>, container_port: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            ..Self::tcp(name, container_port)
        }
    }

    pub fn with_host_port(mut self, host_port: u16) -> Self {
        self.host_port = Some(host_port);
        self
    }
}

/// Condition a dependency must meet before the dependent launches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    #[default]
    Started,
    Healthy,
}

/// Dependency edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependsOn {
    pub name: ServiceName,
    #[serde(default)]
    pub condition: Condition,
}

impl Service {
    pub fn container(name: impl Into<String>, image: impl Into<String>, tag: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ServiceKind::Container {
                image: image.into(),
                tag: tag.into(),
                entrypoint: None,
                args: Vec::new(),
                volumes: Vec::new(),
            },
        )
    }

    pub fn host(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            ServiceKind::Host {
                path: path.into(),
                args: Vec::new(),
            },
        )
    }

    fn with_kind(name: impl Into<String>, kind: ServiceKind) -> Self {
        Self {
            name: name.into(),
            kind,
            ports: Vec::new(),
            env: ServiceEnv::new(),
            depends_on: Vec::new(),
            ready_check: None,
            labels: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn with_args<I, S>(mut self, new_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let new_args = new_args.into_iter().map(Into::into);
        match &mut self.kind {
            ServiceKind::Container { args, .. } | ServiceKind::Host { args, .. } => {
                args.extend(new_args)
            }
        }
        self
    }

    pub fn with_port(mut self, port: Port) -> Self {
        self.ports.push(port);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push(key, value);
        self
    }

    pub fn with_volume(mut self, mount: VolumeMount) -> Self {
        if let ServiceKind::Container { volumes, .. } = &mut self.kind {
            volumes.push(mount);
        }
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn with_ready_check(mut self, check: ReadyCheck) -> Self {
        self.ready_check = Some(check);
        self
    }

    pub fn depends_on(mut self, name: impl Into<String>, condition: Condition) -> Self {
        self.depends_on.push(DependsOn {
            name: name.into(),
            condition,
        });
        self
    }

    pub fn is_container(&self) -> bool {
        matches!(self.kind, ServiceKind::Container { .. })
    }

    /// Full image reference (`image:tag`) for container services.
    pub fn image_ref(&self) -> Option<String> {
        match &self.kind {
            ServiceKind::Container { image, tag, .. } => {
                if image.contains('@') || tag.is_empty() {
                    Some(image.clone())
                } else {
                    Some(format!("{image}:{tag}"))
                }
            }
            ServiceKind::Host { .. } => None,
        }
    }

    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.iter().find(|p| p.name == name)
    }
}
