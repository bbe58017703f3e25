use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{ServiceName, TaskStatus};

/// Engine-side handle of a launched service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskHandle {
    /// Container ID reported by the engine.
    Container(String),
    /// OS process ID of a host service.
    Process(u32),
}

/// Runtime mirror of one service, as kept in the task table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfo {
    pub name: ServiceName,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<TaskHandle>,
    /// When `status` was entered.
    #[serde(with = "crate::serde_ms::epoch", rename = "updatedAtMs")]
    pub updated_at: SystemTime,
    /// Why the service failed or stopped, when it did so on its own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskInfo {
    pub fn new(name: impl Into<ServiceName>) -> Self {
        Self {
            name: name.into(),
            status: TaskStatus::Pending,
            handle: None,
            updated_at: SystemTime::now(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn starts_pending_and_unlaunched() {
        let info = TaskInfo::new("el");
        assert_eq!(info.status, TaskStatus::Pending);
        assert_eq!(info.handle, None);
        assert_eq!(info.error, None);
    }

    #[test]
    fn json_shape() {
        let mut info = TaskInfo::new("el");
        info.updated_at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);
        assert_eq!(
            serde_json::to_string(&info).unwrap(),
            r#"{"name":"el","status":"pending","updatedAtMs":1700000000123}"#
        );

        info.handle = Some(TaskHandle::Process(42));
        info.status = TaskStatus::Failed;
        info.error = Some("exited before becoming healthy".into());
        let back: TaskInfo = serde_json::from_str(&serde_json::to_string(&info).unwrap()).unwrap();
        assert_eq!(back, info);
    }
}
