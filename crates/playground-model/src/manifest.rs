use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::{Service, ServiceKind, SessionId, ValidationError};

/// Immutable description of one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Session identifier; empty means "let the runner pick one".
    #[serde(default)]
    pub session: SessionId,
    pub services: Vec<Service>,
    /// Labels stamped on every engine object of the session.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl Manifest {
    pub fn new(session: impl Into<SessionId>) -> Self {
        Self {
            session: session.into(),
            services: Vec::new(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_service(mut self, service: Service) -> Self {
        self.services.push(service);
        self
    }

    pub fn service(&self, name: &str) -> Option<&Service> {
        self.services.iter().find(|s| s.name == name)
    }

    /// Distinct image references used by container services.
    pub fn images(&self) -> BTreeSet<String> {
        self.services.iter().filter_map(Service::image_ref).collect()
    }

    /// Check every manifest invariant.
    ///
    /// Names are unique, dependency targets exist, the dependency relation
    /// is acyclic, port names are unique per service, explicit host ports
    /// are unique per session and probes parse.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut names = HashSet::new();
        for svc in &self.services {
            if svc.name.trim().is_empty() {
                return Err(ValidationError::EmptyName);
            }
            if !names.insert(svc.name.as_str()) {
                return Err(ValidationError::DuplicateService(svc.name.clone()));
            }
        }

        let mut host_ports: HashMap<(u16, crate::Protocol), &str> = HashMap::new();
        for svc in &self.services {
            match &svc.kind {
                ServiceKind::Container { image, .. } if image.trim().is_empty() => {
                    return Err(ValidationError::EmptyImage(svc.name.clone()));
                }
                ServiceKind::Host { path, .. } if path.trim().is_empty() => {
                    return Err(ValidationError::EmptyExecutable(svc.name.clone()));
                }
                _ => {}
            }

            for dep in &svc.depends_on {
                if !names.contains(dep.name.as_str()) {
                    return Err(ValidationError::MissingDependency {
                        service: svc.name.clone(),
                        target: dep.name.clone(),
                    });
                }
            }

            let mut port_names = HashSet::new();
            for port in &svc.ports {
                if !port_names.insert(port.name.as_str()) {
                    return Err(ValidationError::DuplicatePort {
                        service: svc.name.clone(),
                        port: port.name.clone(),
                    });
                }
                if let Some(host) = port.host_port
                    && let Some(first) = host_ports.insert((host, port.protocol), &svc.name)
                {
                    return Err(ValidationError::DuplicateHostPort {
                        port: host,
                        first: first.to_string(),
                        second: svc.name.clone(),
                    });
                }
            }

            if let Some(check) = &svc.ready_check {
                check
                    .probe()
                    .map_err(|reason| ValidationError::InvalidReadyCheck {
                        service: svc.name.clone(),
                        reason,
                    })?;
            }
        }

        self.topological_order().map(|_| ())
    }

    /// Services ordered so that every dependency precedes its dependents.
    ///
    /// Ties are broken by manifest order, so the result is deterministic.
    pub fn topological_order(&self) -> Result<Vec<&str>, ValidationError> {
        let index: HashMap<&str, usize> = self
            .services
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut indeg = vec![0usize; self.services.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.services.len()];
        for (i, svc) in self.services.iter().enumerate() {
            for dep in &svc.depends_on {
                let Some(&j) = index.get(dep.name.as_str()) else {
                    return Err(ValidationError::MissingDependency {
                        service: svc.name.clone(),
                        target: dep.name.clone(),
                    });
                };
                indeg[i] += 1;
                dependents[j].push(i);
            }
        }

        let mut queue: VecDeque<usize> = (0..self.services.len()).filter(|&i| indeg[i] == 0).collect();
        let mut order = Vec::with_capacity(self.services.len());
        while let Some(u) = queue.pop_front() {
            order.push(self.services[u].name.as_str());
            for &v in &dependents[u] {
                indeg[v] -= 1;
                if indeg[v] == 0 {
                    queue.push_back(v);
                }
            }
        }

        if order.len() != self.services.len() {
            let mut stuck: Vec<String> = (0..self.services.len())
                .filter(|&i| indeg[i] > 0)
                .map(|i| self.services[i].name.clone())
                .collect();
            stuck.sort();
            return Err(ValidationError::DependencyCycle(stuck));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Condition, Port, ReadyCheck};

    fn stack() -> Manifest {
        Manifest::new("s1")
            .with_service(
                Service::container("el", "reth", "latest")
                    .with_port(Port::tcp("http", 8545))
                    .with_ready_check(ReadyCheck::http("http://localhost:8545")),
            )
            .with_service(Service::container("cl", "lighthouse", "latest").depends_on("el", Condition::Healthy))
            .with_service(Service::host("mev-boost", "/bin/mev-boost").depends_on("cl", Condition::Started))
    }

    #[test]
    fn valid_manifest_passes() {
        assert_eq!(stack().validate(), Ok(()));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let m = stack().with_service(Service::host("el", "/bin/true"));
        assert_eq!(m.validate(), Err(ValidationError::DuplicateService("el".into())));
    }

    #[test]
    fn missing_dependency_is_rejected() {
        let m = Manifest::new("s").with_service(Service::host("a", "/bin/a").depends_on("ghost", Condition::Started));
        assert!(matches!(
            m.validate(),
            Err(ValidationError::MissingDependency { target, .. }) if target == "ghost"
        ));
    }

    #[test]
    fn cycles_are_rejected() {
        let m = Manifest::new("s")
            .with_service(Service::host("a", "/bin/a").depends_on("b", Condition::Started))
            .with_service(Service::host("b", "/bin/b").depends_on("a", Condition::Healthy))
            .with_service(Service::host("c", "/bin/c"));
        assert_eq!(
            m.validate(),
            Err(ValidationError::DependencyCycle(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn explicit_host_port_collisions_are_rejected() {
        let m = Manifest::new("s")
            .with_service(Service::host("a", "/bin/a").with_port(Port::tcp("http", 80).with_host_port(8080)))
            .with_service(Service::host("b", "/bin/b").with_port(Port::tcp("http", 80).with_host_port(8080)));
        assert!(matches!(
            m.validate(),
            Err(ValidationError::DuplicateHostPort { port: 8080, .. })
        ));

        // Same number over a different protocol is fine.
        let m = Manifest::new("s")
            .with_service(Service::host("a", "/bin/a").with_port(Port::tcp("p2p", 30303).with_host_port(30303)))
            .with_service(Service::host("b", "/bin/b").with_port(Port::udp("disc", 30303).with_host_port(30303)));
        assert_eq!(m.validate(), Ok(()));
    }

    #[test]
    fn duplicate_port_names_are_rejected() {
        let m = Manifest::new("s").with_service(
            Service::container("el", "reth", "latest")
                .with_port(Port::tcp("http", 8545))
                .with_port(Port::tcp("http", 8546)),
        );
        assert!(matches!(m.validate(), Err(ValidationError::DuplicatePort { .. })));
    }

    #[test]
    fn invalid_probe_is_rejected() {
        let m = Manifest::new("s")
            .with_service(Service::host("a", "/bin/a").with_ready_check(ReadyCheck::new(["tcp://nowhere"])));
        assert!(matches!(m.validate(), Err(ValidationError::InvalidReadyCheck { .. })));
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let m = Manifest::new("s")
            .with_service(Service::host("c", "/bin/c").depends_on("a", Condition::Healthy).depends_on("b", Condition::Healthy))
            .with_service(Service::container("b", "nginx", "latest"))
            .with_service(Service::host("a", "/bin/a"));
        assert_eq!(m.topological_order().unwrap(), vec!["b", "a", "c"]);
    }

    #[test]
    fn images_are_deduplicated() {
        let m = Manifest::new("s")
            .with_service(Service::container("a", "alpine", "latest"))
            .with_service(Service::container("b", "alpine", "latest"))
            .with_service(Service::host("c", "/bin/c"));
        assert_eq!(m.images().into_iter().collect::<Vec<_>>(), vec!["alpine:latest"]);
    }

    #[test]
    fn manifest_json_keeps_host_port_assignments() {
        let mut m = stack();
        m.services[0].ports[0].host_port = Some(34567);

        let json = serde_json::to_string_pretty(&m).unwrap();
        let back: Manifest = serde_json::from_str(&json).unwrap();
        assert_eq!(back.services[0].ports[0].host_port, Some(34567));
        assert_eq!(back, m);
    }

    #[test]
    fn demo_manifest_parses_and_orders() {
        let m: Manifest = serde_json::from_str(include_str!("../../../demos/devnet.json")).unwrap();
        m.validate().unwrap();

        assert_eq!(m.session, "devnet");
        assert_eq!(m.images().into_iter().collect::<Vec<_>>(), vec!["ghcr.io/paradigmxyz/reth:v1.1.0"]);
        assert_eq!(m.topological_order().unwrap(), vec!["el", "relay", "builder"]);
        assert_eq!(m.service("builder").unwrap().depends_on[1].condition, Condition::Started);
    }
}
