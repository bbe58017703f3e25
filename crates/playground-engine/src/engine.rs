use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::{ContainerSpec, ContainerSummary, EngineEvent, EngineResult, LabelFilter, NetworkSpec};

/// Follow-mode log chunks of one container.
pub type LogStream = BoxStream<'static, EngineResult<Vec<u8>>>;

/// Container events matching a label filter; ends when the connection drops.
pub type EventStream = BoxStream<'static, EngineResult<EngineEvent>>;

/// Operations the runner needs from a container engine.
///
/// Implementations must be cheap to share (`Arc<dyn Engine>`) and safe to
/// call concurrently.
#[async_trait]
pub trait Engine: Send + Sync + 'static {
    // images
    async fn image_exists(&self, image: &str) -> EngineResult<bool>;
    async fn pull_image(&self, image: &str, platform: Option<&str>) -> EngineResult<()>;

    // containers
    async fn create_container(&self, spec: &ContainerSpec) -> EngineResult<String>;
    async fn start_container(&self, id: &str) -> EngineResult<()>;
    /// Stop with `grace` before the engine kills; already stopped is `Ok`.
    async fn stop_container(&self, id: &str, grace: Duration) -> EngineResult<()>;
    /// Force-remove together with anonymous volumes.
    async fn remove_container(&self, id: &str) -> EngineResult<()>;
    async fn list_containers(&self, filter: &LabelFilter) -> EngineResult<Vec<ContainerSummary>>;
    fn container_logs(&self, id: &str) -> LogStream;

    // events
    fn events(&self, filter: &LabelFilter) -> EventStream;

    // networks
    async fn create_network(&self, spec: &NetworkSpec) -> EngineResult<String>;
    async fn remove_network(&self, name: &str) -> EngineResult<()>;
    async fn list_networks(&self, filter: &LabelFilter) -> EngineResult<Vec<String>>;
}
