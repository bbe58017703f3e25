use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use playground_engine::{ContainerSummary, Engine, LabelFilter};
use playground_model::{LABEL_COMPOSE_SERVICE, LABEL_PLAYGROUND, LABEL_SESSION, PORT_LABEL_PREFIX};

use crate::error::PortQueryError;

/// Sessions with at least one running container, sorted.
pub async fn list_sessions(engine: &dyn Engine) -> Result<Vec<String>, PortQueryError> {
    let containers = engine
        .list_containers(&LabelFilter::new().with_key(LABEL_PLAYGROUND))
        .await?;
    let sessions: BTreeSet<String> = containers
        .iter()
        .filter(|c| c.is_running())
        .filter_map(|c| c.labels.get(LABEL_SESSION).cloned())
        .collect();
    Ok(sessions.into_iter().collect())
}

/// `session` itself, or the only running session when it is empty.
pub async fn resolve_session(engine: &dyn Engine, session: &str) -> Result<String, PortQueryError> {
    if !session.is_empty() {
        return Ok(session.to_string());
    }
    let mut sessions = list_sessions(engine).await?;
    match sessions.len() {
        0 => Err(PortQueryError::NoSession),
        1 => Ok(sessions.remove(0)),
        _ => Err(PortQueryError::AmbiguousSession(sessions)),
    }
}

/// Named ports of a container, recovered from its `port.<name>` labels.
fn port_labels(c: &ContainerSummary) -> BTreeMap<String, u16> {
    c.labels
        .iter()
        .filter_map(|(k, v)| {
            let name = k.strip_prefix(PORT_LABEL_PREFIX)?;
            Some((name.to_string(), v.parse().ok()?))
        })
        .collect()
}

fn host_port(c: &ContainerSummary, container_port: u16) -> Option<u16> {
    c.ports
        .iter()
        .filter(|p| p.private_port == container_port)
        .find_map(|p| p.public_port)
}

/// Host port of `service`'s port `port` in `session`.
///
/// An empty `port` returns every published port as `name: hostPort`
/// lines sorted by name; an empty `session` picks the only running one.
pub async fn get_service_port(
    engine: &dyn Engine,
    session: &str,
    service: &str,
    port: &str,
) -> Result<String, PortQueryError> {
    let session = resolve_session(engine, session).await?;
    let filter = LabelFilter::new()
        .with_key(LABEL_PLAYGROUND)
        .with_label(LABEL_SESSION, &session)
        .with_label(LABEL_COMPOSE_SERVICE, service);

    let containers = engine.list_containers(&filter).await?;
    let container = containers
        .iter()
        .find(|c| c.is_running())
        .or_else(|| containers.first())
        .ok_or_else(|| PortQueryError::ServiceNotFound {
            session: session.clone(),
            service: service.to_string(),
        })?;
    debug!(target: "playground.core.query", %session, service, container = %container.id, "resolving port");

    let named = port_labels(container);
    if port.is_empty() {
        let lines: Vec<String> = named
            .iter()
            .filter_map(|(name, cp)| host_port(container, *cp).map(|hp| format!("{name}: {hp}")))
            .collect();
        return Ok(lines.join("\n"));
    }

    let Some(container_port) = named.get(port) else {
        return Err(PortQueryError::PortNotFound {
            service: service.to_string(),
            port: port.to_string(),
            available: named.keys().cloned().collect(),
        });
    };
    host_port(container, *container_port)
        .map(|hp| hp.to_string())
        .ok_or_else(|| PortQueryError::NotPublished {
            service: service.to_string(),
            port: port.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::fake::FakeEngine;
    use playground_engine::{ContainerSpec, PortMapping};
    use playground_model::{LABEL_SERVICE, port_label};

    fn el(session: &str, host: u16) -> ContainerSpec {
        ContainerSpec {
            name: format!("{session}-el"),
            image: "reth:latest".into(),
            labels: HashMap::from([
                (LABEL_PLAYGROUND.to_string(), "true".to_string()),
                (LABEL_SESSION.to_string(), session.to_string()),
                (LABEL_SERVICE.to_string(), "el".to_string()),
                (LABEL_COMPOSE_SERVICE.to_string(), "el".to_string()),
                (port_label("http"), "8545".to_string()),
                (port_label("authrpc"), "8551".to_string()),
            ]),
            ports: vec![
                PortMapping {
                    container_port: 8545,
                    protocol: "tcp".into(),
                    host_ip: "127.0.0.1".into(),
                    host_port: host,
                },
                PortMapping {
                    container_port: 8551,
                    protocol: "tcp".into(),
                    host_ip: "127.0.0.1".into(),
                    host_port: host + 1,
                },
            ],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn named_port_resolves_to_host_port() {
        let engine = FakeEngine::new();
        engine.add_running(el("s1", 34567));

        assert_eq!(get_service_port(&engine, "s1", "el", "http").await.unwrap(), "34567");
        assert_eq!(
            get_service_port(&engine, "s1", "el", "").await.unwrap(),
            "authrpc: 34568\nhttp: 34567"
        );
    }

    #[tokio::test]
    async fn unknown_port_lists_available_names() {
        let engine = FakeEngine::new();
        engine.add_running(el("s1", 34567));

        let err = get_service_port(&engine, "s1", "el", "rpc").await.unwrap_err();
        match &err {
            PortQueryError::PortNotFound { available, .. } => {
                assert_eq!(available, &vec!["authrpc".to_string(), "http".to_string()])
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(err.to_string().contains("http"));
    }

    #[tokio::test]
    async fn unknown_service_is_reported() {
        let engine = FakeEngine::new();
        engine.add_running(el("s1", 34567));
        assert!(matches!(
            get_service_port(&engine, "s1", "cl", "http").await,
            Err(PortQueryError::ServiceNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn empty_session_needs_exactly_one_running() {
        let engine = FakeEngine::new();
        assert!(matches!(resolve_session(&engine, "").await, Err(PortQueryError::NoSession)));

        engine.add_running(el("s1", 34567));
        assert_eq!(resolve_session(&engine, "").await.unwrap(), "s1");
        assert_eq!(get_service_port(&engine, "", "el", "http").await.unwrap(), "34567");

        engine.add_running(el("s2", 44567));
        match resolve_session(&engine, "").await {
            Err(PortQueryError::AmbiguousSession(list)) => assert_eq!(list, vec!["s1", "s2"]),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(resolve_session(&engine, "s2").await.unwrap(), "s2");
    }
}
