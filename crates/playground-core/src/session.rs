use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use playground_model::Manifest;

use crate::error::{RunnerError, RunnerResult};

const MANIFEST_FILE: &str = "manifest.json";

/// On-disk home of one session: `<base>/<session>/`.
///
/// Holds `manifest.json`, one `<service>.log` per service and generated
/// artifacts; relative volume paths are anchored here.
#[derive(Debug, Clone)]
pub struct SessionDir {
    root: PathBuf,
}

fn session_err(path: &Path, e: impl ToString) -> RunnerError {
    RunnerError::Session {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

impl SessionDir {
    pub async fn create(base: &Path, session: &str) -> RunnerResult<Self> {
        let root = base.join(session);
        fs::create_dir_all(&root)
            .await
            .map_err(|e| session_err(&root, e))?;
        let root = fs::canonicalize(&root)
            .await
            .map_err(|e| session_err(&root, e))?;
        debug!(target: "playground.core.session", path = %root.display(), "session directory ready");
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(MANIFEST_FILE)
    }

    pub fn log_path(&self, service: &str) -> PathBuf {
        self.root.join(format!("{service}.log"))
    }

    /// Absolute paths stay as they are; relative ones resolve under the session.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.root.join(p)
        }
    }

    pub async fn write_manifest(&self, manifest: &Manifest) -> RunnerResult<()> {
        let path = self.manifest_path();
        let json = serde_json::to_vec_pretty(manifest).map_err(|e| session_err(&path, e))?;
        fs::write(&path, json).await.map_err(|e| session_err(&path, e))
    }

    pub async fn read_manifest(&self) -> RunnerResult<Manifest> {
        let path = self.manifest_path();
        let raw = fs::read(&path).await.map_err(|e| session_err(&path, e))?;
        serde_json::from_slice(&raw).map_err(|e| session_err(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use playground_model::{Port, Service};

    #[tokio::test]
    async fn manifest_round_trips_through_the_session_dir() {
        let base = tempfile::tempdir().unwrap();
        let dir = SessionDir::create(base.path(), "s1").await.unwrap();
        assert!(dir.path().ends_with("s1"));

        let mut m = Manifest::new("s1").with_service(
            Service::container("el", "reth", "v1")
                .with_port(Port::tcp("http", 8545))
                .with_env("RUST_LOG", "info"),
        );
        m.services[0].ports[0].host_port = Some(34567);

        dir.write_manifest(&m).await.unwrap();
        assert_eq!(dir.read_manifest().await.unwrap(), m);
    }

    #[tokio::test]
    async fn relative_paths_are_anchored() {
        let base = tempfile::tempdir().unwrap();
        let dir = SessionDir::create(base.path(), "s1").await.unwrap();
        assert_eq!(dir.resolve("genesis.json"), dir.path().join("genesis.json"));
        assert_eq!(dir.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(dir.log_path("el"), dir.path().join("el.log"));
    }

    #[tokio::test]
    async fn missing_manifest_is_a_session_error() {
        let base = tempfile::tempdir().unwrap();
        let dir = SessionDir::create(base.path(), "s1").await.unwrap();
        assert!(matches!(dir.read_manifest().await, Err(RunnerError::Session { .. })));
    }
}
