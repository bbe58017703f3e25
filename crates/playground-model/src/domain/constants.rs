/// Marks every engine object owned by the playground.
pub const LABEL_PLAYGROUND: &str = "playground";

/// Scopes engine objects to one session; teardown and queries filter by it.
pub const LABEL_SESSION: &str = "playground.session";

/// Service name of a service container.
pub const LABEL_SERVICE: &str = "playground.service";

/// Set on healthmon sidecars; value is the name of the probed service.
pub const LABEL_HEALTHMON: &str = "playground.healthmon";

/// Compose-compatible service label consumed by the port query.
pub const LABEL_COMPOSE_SERVICE: &str = "com.docker.compose.service";

/// Prefix of the per-port labels (`port.<name>=<containerPort>`).
pub const PORT_LABEL_PREFIX: &str = "port.";

/// Label key recording the container port of a named service port.
#[inline]
pub fn port_label(name: &str) -> String {
    format!("{PORT_LABEL_PREFIX}{name}")
}
