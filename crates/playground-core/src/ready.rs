use std::{collections::HashMap, time::Duration};

use tokio_util::sync::CancellationToken;

use playground_model::{TaskInfo, TaskStatus};

use crate::{
    error::{RunnerError, RunnerResult},
    table::TaskTable,
};

/// Service name to "declares a ready check".
pub(crate) type Requirements = HashMap<String, bool>;

fn is_ready(info: &TaskInfo, probed: bool) -> bool {
    match info.status {
        TaskStatus::Healthy => true,
        TaskStatus::Started => !probed,
        _ => false,
    }
}

/// Failed, or stopped on its own (a crash); teardown stops carry no error.
fn is_dead(info: &TaskInfo) -> bool {
    match info.status {
        TaskStatus::Failed => true,
        TaskStatus::Stopped => info.error.is_some(),
        _ => false,
    }
}

fn pending(tasks: &HashMap<String, TaskInfo>, reqs: &Requirements) -> Vec<String> {
    let mut names: Vec<String> = reqs
        .iter()
        .filter(|(name, probed)| !tasks.get(*name).is_some_and(|i| is_ready(i, **probed)))
        .map(|(name, _)| name.clone())
        .collect();
    names.sort();
    names
}

/// `Some` once the wait is decided: a failure wins over readiness.
fn evaluate(tasks: &HashMap<String, TaskInfo>, reqs: &Requirements) -> Option<RunnerResult<()>> {
    let mut failed: Vec<&TaskInfo> = tasks.values().filter(|i| is_dead(i)).collect();
    failed.sort_by(|a, b| a.name.cmp(&b.name));
    if let Some(info) = failed.first() {
        return Some(Err(RunnerError::ServiceFailed {
            service: info.name.clone(),
            reason: info.error.clone().unwrap_or_else(|| "failed".to_string()),
        }));
    }
    pending(tasks, reqs).is_empty().then_some(Ok(()))
}

/// Wait until every probed service is healthy and every other one started.
pub(crate) async fn wait_ready(
    table: &TaskTable,
    reqs: &Requirements,
    deadline: Duration,
    cancel: &CancellationToken,
) -> RunnerResult<()> {
    let wait = tokio::time::timeout(deadline, table.wait_for(|tasks| evaluate(tasks, reqs)));
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunnerError::Cancelled),
        res = wait => match res {
            Ok(outcome) => outcome,
            Err(_) => {
                let snapshot: HashMap<String, TaskInfo> =
                    table.snapshot().into_iter().map(|i| (i.name.clone(), i)).collect();
                Err(RunnerError::DeadlineExceeded {
                    pending: pending(&snapshot, reqs),
                })
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::observers::Observers;

    fn setup() -> (Arc<TaskTable>, Requirements) {
        let table = Arc::new(TaskTable::new(["el", "relay"], Arc::new(Observers::default())));
        let reqs = HashMap::from([("el".to_string(), true), ("relay".to_string(), false)]);
        (table, reqs)
    }

    #[tokio::test(start_paused = true)]
    async fn ready_when_probed_healthy_and_others_started() {
        let (t, reqs) = setup();
        t.update("el", TaskStatus::Started);
        t.update("relay", TaskStatus::Started);

        let cancel = CancellationToken::new();
        let waiter = {
            let t = t.clone();
            let reqs = reqs.clone();
            tokio::spawn(async move { wait_ready(&t, &reqs, Duration::from_secs(10), &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        t.update("el", TaskStatus::Healthy);
        assert_eq!(waiter.await.unwrap(), Ok(()));
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_lists_pending_services() {
        let (t, reqs) = setup();
        t.update("el", TaskStatus::Started);
        let started = tokio::time::Instant::now();

        let err = wait_ready(&t, &reqs, Duration::from_millis(500), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RunnerError::DeadlineExceeded {
                pending: vec!["el".into(), "relay".into()]
            }
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(500) && elapsed < Duration::from_millis(750));
    }

    #[tokio::test]
    async fn failure_is_surfaced() {
        let (t, reqs) = setup();
        t.update("el", TaskStatus::Started);
        t.fail("el", "exited with code 1 before becoming healthy");
        let err = wait_ready(&t, &reqs, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::ServiceFailed { service, .. } if service == "el"));
    }

    #[tokio::test]
    async fn crash_after_healthy_is_not_ready() {
        let (t, reqs) = setup();
        t.update("el", TaskStatus::Started);
        t.update("el", TaskStatus::Healthy);
        t.update("relay", TaskStatus::Started);
        t.update("relay", TaskStatus::Healthy);
        t.stop("relay", Some("crashed: exited with code 1".into()));

        let err = wait_ready(&t, &reqs, Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RunnerError::ServiceFailed {
                service: "relay".into(),
                reason: "crashed: exited with code 1".into(),
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_service_is_still_pending() {
        let (t, reqs) = setup();
        t.update("el", TaskStatus::Started);
        t.update("el", TaskStatus::Healthy);
        t.update("relay", TaskStatus::Started);
        t.stop("relay", None);

        let err = wait_ready(&t, &reqs, Duration::from_millis(100), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, RunnerError::DeadlineExceeded { pending: vec!["relay".into()] });
    }

    #[tokio::test]
    async fn cancellation_wins() {
        let (t, reqs) = setup();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = wait_ready(&t, &reqs, Duration::from_secs(5), &cancel).await.unwrap_err();
        assert_eq!(err, RunnerError::Cancelled);
    }
}
