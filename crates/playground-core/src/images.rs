use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use tokio::sync::OnceCell;
use tracing::{debug, info};

use playground_engine::Engine;
use playground_model::{RunnerEvent, TaskStatus};

use crate::{
    error::{RunnerError, RunnerResult},
    observers::Observers,
    table::TaskTable,
};

type PullCell = Arc<OnceCell<Result<(), String>>>;

/// Ensures images exist locally, issuing at most one pull per image.
pub(crate) struct ImagePuller {
    engine: Arc<dyn Engine>,
    platform: Option<String>,
    inflight: Mutex<HashMap<String, PullCell>>,
}

impl ImagePuller {
    pub(crate) fn new(engine: Arc<dyn Engine>, platform: Option<String>) -> Self {
        Self {
            engine,
            platform,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Make `image` available; concurrent callers share one engine pull.
    pub(crate) async fn ensure(&self, image: &str) -> RunnerResult<()> {
        let cell = self
            .inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(image.to_string())
            .or_default()
            .clone();

        let outcome = cell
            .get_or_init(|| async {
                match self.engine.image_exists(image).await {
                    Ok(true) => {
                        debug!(target: "playground.core.images", image, "image present locally");
                        Ok(())
                    }
                    Ok(false) | Err(_) => {
                        info!(target: "playground.core.images", image, platform = ?self.platform, "pulling image");
                        self.engine
                            .pull_image(image, self.platform.as_deref())
                            .await
                            .map_err(|e| e.to_string())
                    }
                }
            })
            .await;

        outcome.clone().map_err(|reason| RunnerError::PullFailed {
            image: image.to_string(),
            reason,
        })
    }

    /// [`ImagePuller::ensure`] on behalf of `service`, reporting progress.
    pub(crate) async fn ensure_for(
        &self,
        service: &str,
        image: &str,
        table: &TaskTable,
        observers: &Observers,
    ) -> RunnerResult<()> {
        table.update(service, TaskStatus::Pulling);
        observers.emit(RunnerEvent::ImagePulling {
            service: service.to_string(),
            image: image.to_string(),
        });

        if let Err(e) = self.ensure(image).await {
            table.fail(service, e.to_string());
            return Err(e);
        }

        observers.emit(RunnerEvent::ImagePulled {
            service: service.to_string(),
            image: image.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::FakeEngine;

    #[tokio::test]
    async fn concurrent_callers_share_one_pull() {
        let engine = Arc::new(FakeEngine::new());
        let puller = ImagePuller::new(engine.clone(), None);

        let (a, b, c) = tokio::join!(
            puller.ensure("alpine:latest"),
            puller.ensure("alpine:latest"),
            puller.ensure("nginx:1")
        );
        assert!(a.is_ok() && b.is_ok() && c.is_ok());

        let mut pulls = engine.pulls();
        pulls.sort();
        assert_eq!(pulls, vec!["alpine:latest", "nginx:1"]);
    }

    #[tokio::test]
    async fn local_images_are_not_pulled() {
        let engine = Arc::new(FakeEngine::new().with_image("alpine:latest"));
        let puller = ImagePuller::new(engine.clone(), None);

        puller.ensure("alpine:latest").await.unwrap();
        assert!(engine.pulls().is_empty());
    }

    #[tokio::test]
    async fn failure_is_shared_and_fails_the_task() {
        let engine = Arc::new(FakeEngine::new().with_failing_image("broken:1"));
        let puller = ImagePuller::new(engine.clone(), None);
        let observers = Arc::new(Observers::default());
        let table = TaskTable::new(["a", "b"], observers.clone());

        let (a, b) = tokio::join!(
            puller.ensure_for("a", "broken:1", &table, &observers),
            puller.ensure_for("b", "broken:1", &table, &observers)
        );

        assert!(matches!(a, Err(RunnerError::PullFailed { ref image, .. }) if image == "broken:1"));
        assert_eq!(a, b);
        assert_eq!(engine.pulls().len(), 1);
        assert_eq!(table.status("a"), Some(TaskStatus::Failed));
        assert_eq!(table.status("b"), Some(TaskStatus::Failed));
    }
}
