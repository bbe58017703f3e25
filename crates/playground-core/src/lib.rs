//! Local orchestration of a session's services.
//!
//! A [`Runner`] takes a validated [`Manifest`](playground_model::Manifest)
//! and brings every service up on top of an
//! [`Engine`](playground_engine::Engine): host ports are assigned, images
//! pulled once per distinct reference, a session network created, and each
//! service launched (as a container or a host process) once its
//! dependencies meet their condition. Readiness is tracked in a shared
//! [`TaskTable`] driven by engine events, healthmon sidecars and in-process
//! probes. [`Runner::stop`] releases everything the session owns.
//!
//! Sessions can be inspected and cleaned up from another process through
//! the label-based helpers [`list_sessions`], [`get_service_port`] and
//! [`clean`].

mod config;
pub use config::{Backoff, RunnerConfig};

mod error;
pub use error::{PortQueryError, RunnerError, RunnerResult};

mod observers;

mod table;
pub use table::TaskTable;

mod session;
pub use session::SessionDir;

mod ports;
pub use ports::allocate_ports;

mod probe;
pub use probe::{ProbeError, Prober};

mod query;
pub use query::{get_service_port, list_sessions, resolve_session};

mod teardown;
pub use teardown::clean;

mod runner;
pub use runner::Runner;

mod container;
mod context;
mod host;
mod images;
mod logs;
mod network;
mod ordering;
mod ready;
mod sidecar;
mod watcher;

#[cfg(test)]
mod fake;
