use std::collections::HashMap;

/// Label constraints; an engine object matches when it carries every entry.
///
/// A `None` value matches any value of the key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFilter {
    labels: Vec<(String, Option<String>)>,
}

impl LabelFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.push((key.into(), Some(value.into())));
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.labels.push((key.into(), None));
        self
    }

    /// Docker filter syntax: `key` or `key=value`.
    pub fn to_filters(&self) -> Vec<String> {
        self.labels
            .iter()
            .map(|(k, v)| match v {
                Some(v) => format!("{k}={v}"),
                None => k.clone(),
            })
            .collect()
    }

    pub fn matches(&self, labels: &HashMap<String, String>) -> bool {
        self.labels.iter().all(|(k, v)| match (labels.get(k), v) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        })
    }
}

/// Host port publication of one container port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortMapping {
    pub container_port: u16,
    /// `tcp` or `udp`.
    pub protocol: String,
    pub host_ip: String,
    pub host_port: u16,
}

impl PortMapping {
    /// Engine key of the container side, e.g. `8545/tcp`.
    pub fn key(&self) -> String {
        format!("{}/{}", self.container_port, self.protocol)
    }
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub entrypoint: Option<Vec<String>>,
    pub cmd: Vec<String>,
    /// `KEY=VALUE` entries.
    pub env: Vec<String>,
    pub labels: HashMap<String, String>,
    /// `host:container[:ro]` bind mounts.
    pub binds: Vec<String>,
    pub ports: Vec<PortMapping>,
    /// Network to attach to, or `container:<id>` to share a namespace.
    pub network_mode: Option<String>,
    pub network_aliases: Vec<String>,
    pub working_dir: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkSpec {
    pub name: String,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedPort {
    pub private_port: u16,
    pub public_port: Option<u16>,
    pub protocol: String,
}

/// Container as reported by a list call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
    /// `created`, `running`, `exited`, ...
    pub state: String,
    /// Exit code, when the container has exited.
    pub exit_code: Option<i64>,
    pub ports: Vec<PublishedPort>,
}

impl ContainerSummary {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }

    pub fn has_exited(&self) -> bool {
        matches!(self.state.as_str(), "exited" | "dead")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerAction {
    Start,
    Die { exit_code: i64 },
    Other(String),
}

/// Container lifecycle event from the engine event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub container_id: String,
    pub action: ContainerAction,
    pub labels: HashMap<String, String>,
}

/// Extract the exit code from a status line like `Exited (137) 2 minutes ago`.
pub fn parse_exit_code(status: &str) -> Option<i64> {
    let rest = status.trim().strip_prefix("Exited (")?;
    let (code, _) = rest.split_once(')')?;
    code.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_filter_renders_docker_syntax() {
        let f = LabelFilter::new().with_label("playground.session", "s1").with_key("playground");
        assert_eq!(f.to_filters(), vec!["playground.session=s1", "playground"]);
    }

    #[test]
    fn label_filter_matches_all_entries() {
        let f = LabelFilter::new().with_label("playground.session", "s1").with_key("playground");
        let mut labels = HashMap::from([
            ("playground".to_string(), "true".to_string()),
            ("playground.session".to_string(), "s1".to_string()),
        ]);
        assert!(f.matches(&labels));

        labels.insert("playground.session".into(), "s2".into());
        assert!(!f.matches(&labels));

        labels.remove("playground");
        assert!(!LabelFilter::new().with_key("playground").matches(&labels));
    }

    #[test]
    fn exit_code_is_parsed_from_status() {
        assert_eq!(parse_exit_code("Exited (0) 3 seconds ago"), Some(0));
        assert_eq!(parse_exit_code("Exited (137) About a minute ago"), Some(137));
        assert_eq!(parse_exit_code("Up 5 seconds"), None);
    }

    #[test]
    fn port_mapping_key() {
        let m = PortMapping {
            container_port: 30303,
            protocol: "udp".into(),
            host_ip: "127.0.0.1".into(),
            host_port: 40000,
        };
        assert_eq!(m.key(), "30303/udp");
    }
}
