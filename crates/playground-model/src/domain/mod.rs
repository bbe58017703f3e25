mod kv;
pub use kv::KeyValue;

mod service_env;
pub use service_env::ServiceEnv;

mod constants;
pub use constants::{
    LABEL_COMPOSE_SERVICE, LABEL_HEALTHMON, LABEL_PLAYGROUND, LABEL_SERVICE, LABEL_SESSION,
    PORT_LABEL_PREFIX, port_label,
};

mod task_info;
pub use task_info::{TaskHandle, TaskInfo};

mod task_status;
pub use task_status::TaskStatus;

/// Logical service name, unique within a manifest.
pub type ServiceName = String;

/// Session identifier; scopes every engine object created for one invocation.
pub type SessionId = String;
