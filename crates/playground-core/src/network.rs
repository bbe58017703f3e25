use std::collections::HashMap;

use tracing::{debug, info};

use playground_engine::{Engine, EngineError, EngineResult, NetworkSpec};
use playground_model::{LABEL_PLAYGROUND, LABEL_SESSION};

use crate::error::{RunnerError, RunnerResult};

/// Create the session bridge network. An existing network of the same
/// name is reused.
pub(crate) async fn create_network(engine: &dyn Engine, name: &str, session: &str) -> RunnerResult<()> {
    let spec = NetworkSpec {
        name: name.to_string(),
        labels: HashMap::from([
            (LABEL_PLAYGROUND.to_string(), "true".to_string()),
            (LABEL_SESSION.to_string(), session.to_string()),
        ]),
    };
    match engine.create_network(&spec).await {
        Ok(_) => {
            info!(target: "playground.core.network", network = name, "network created");
            Ok(())
        }
        Err(EngineError::Conflict(_)) => {
            debug!(target: "playground.core.network", network = name, "network exists, reusing");
            Ok(())
        }
        Err(e) => Err(RunnerError::NetworkCreateFailed {
            network: name.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Remove a network; a missing one counts as removed.
pub(crate) async fn remove_network(engine: &dyn Engine, name: &str) -> EngineResult<()> {
    match engine.remove_network(name).await {
        Ok(()) => {
            debug!(target: "playground.core.network", network = name, "network removed");
            Ok(())
        }
        Err(e) if e.is_not_found() => Ok(()),
        Err(e) => Err(e),
    }
}
