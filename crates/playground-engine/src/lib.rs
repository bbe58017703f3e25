//! Container-engine seam of the playground.
//!
//! The runner talks to the engine exclusively through [`Engine`], with
//! engine-neutral request and response types. [`DockerEngine`] implements it
//! on top of a Docker-compatible HTTP API.

mod error;
pub use error::{EngineError, EngineResult};

mod types;
pub use types::{
    ContainerAction, ContainerSpec, ContainerSummary, EngineEvent, LabelFilter, NetworkSpec,
    PortMapping, PublishedPort, parse_exit_code,
};

mod engine;
pub use engine::{Engine, EventStream, LogStream};

mod docker;
pub use docker::DockerEngine;
