//! Plain data shared by every playground crate.
//!
//! A [`Manifest`] is the validated, immutable description of a session: the
//! services to bring up, how they depend on each other and how readiness is
//! probed. Runtime state is mirrored per service by [`TaskInfo`], and
//! lifecycle notifications travel as [`RunnerEvent`]s to [`Observe`]rs.

mod domain;
pub use domain::*;

mod error;
pub use error::ValidationError;

mod event;
pub use event::{EventKind, Observe, RunnerEvent};

mod manifest;
pub use manifest::Manifest;

mod probe;
pub use probe::{ProbeKind, ReadyCheck};

mod service;
pub use service::{Condition, DependsOn, Port, Protocol, Service, ServiceKind, VolumeMount};

mod serde_ms;
