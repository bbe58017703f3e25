use playground_model::{Condition, Service, TaskStatus};

use crate::{
    error::{RunnerError, RunnerResult},
    table::TaskTable,
};

/// Whether a dependency in `status` satisfies `condition`.
///
/// `None` means it can no longer be satisfied.
fn satisfied(status: TaskStatus, condition: Condition) -> Option<bool> {
    match (status, condition) {
        (TaskStatus::Failed | TaskStatus::Stopped, _) => None,
        (TaskStatus::Started, Condition::Started) => Some(true),
        (TaskStatus::Healthy, _) => Some(true),
        _ => Some(false),
    }
}

/// Block until every dependency of `svc` meets its condition.
///
/// Fails with `LaunchFailed` as soon as a dependency fails or stops
/// without the condition having been observed.
pub(crate) async fn wait_for_dependencies(table: &TaskTable, svc: &Service) -> RunnerResult<()> {
    if svc.depends_on.is_empty() {
        return Ok(());
    }
    table
        .wait_for(|tasks| {
            let mut ready = true;
            for dep in &svc.depends_on {
                let Some(info) = tasks.get(&dep.name) else {
                    return Some(Err(RunnerError::launch(
                        &svc.name,
                        format!("unknown dependency {}", dep.name),
                    )));
                };
                match satisfied(info.status, dep.condition) {
                    None => {
                        return Some(Err(RunnerError::launch(
                            &svc.name,
                            format!("dependency {} is {}", dep.name, info.status),
                        )));
                    }
                    Some(ok) => ready &= ok,
                }
            }
            ready.then_some(Ok(()))
        })
        .await
}
