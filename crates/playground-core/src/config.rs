use std::{
    net::{IpAddr, Ipv4Addr},
    path::PathBuf,
    time::Duration,
};

use playground_model::ServiceEnv;

/// Exponential delay: `first * factor^attempt`, clamped to `max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub first: Duration,
    pub max: Duration,
    pub factor: f64,
}

impl Backoff {
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if !secs.is_finite() || secs >= self.max.as_secs_f64() {
            return self.max;
        }
        Duration::from_secs_f64(secs.max(0.0))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            first: Duration::from_millis(200),
            max: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

/// Runner knobs. Everything has a sensible default for local use.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Overrides the manifest session id.
    pub session: Option<String>,
    /// Parent of the per-session directories.
    pub base_dir: PathBuf,
    /// Network name; `playground-<session>` when unset.
    pub network: Option<String>,
    pub cleanup_network: bool,
    pub remove_containers: bool,
    /// Grace given to containers on stop before the engine kills them.
    pub stop_grace: Duration,
    /// Grace between SIGTERM and SIGKILL for host processes.
    pub host_grace: Duration,
    /// Image running HTTP and TCP probes next to container services.
    pub healthmon_image: String,
    /// Address published container ports bind to.
    pub bind_ip: IpAddr,
    /// Platform requested on pulls, e.g. `linux/amd64`.
    pub platform: Option<String>,
    pub reconcile_interval: Duration,
    pub reconnect: Backoff,
    /// Merged below every service environment.
    pub base_env: ServiceEnv,
}

impl RunnerConfig {
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_cleanup_network(mut self, cleanup: bool) -> Self {
        self.cleanup_network = cleanup;
        self
    }

    pub fn with_remove_containers(mut self, remove: bool) -> Self {
        self.remove_containers = remove;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_host_grace(mut self, grace: Duration) -> Self {
        self.host_grace = grace;
        self
    }

    pub fn with_healthmon_image(mut self, image: impl Into<String>) -> Self {
        self.healthmon_image = image.into();
        self
    }

    /// Publish ports on every interface instead of loopback.
    pub fn with_external_bind(mut self, external: bool) -> Self {
        self.bind_ip = if external {
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        } else {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        };
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_reconcile_interval(mut self, every: Duration) -> Self {
        self.reconcile_interval = every;
        self
    }

    pub fn with_reconnect(mut self, backoff: Backoff) -> Self {
        self.reconnect = backoff;
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.base_env.push(key.into(), value.into());
        self
    }

    /// Network name for `session`.
    pub fn network_name(&self, session: &str) -> String {
        self.network
            .clone()
            .unwrap_or_else(|| format!("playground-{session}"))
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let base_dir = std::env::var_os("HOME")
            .map(|home| PathBuf::from(home).join(".playground").join("sessions"))
            .unwrap_or_else(|| std::env::temp_dir().join("playground"));
        Self {
            session: None,
            base_dir,
            network: None,
            cleanup_network: true,
            remove_containers: true,
            stop_grace: Duration::from_secs(10),
            host_grace: Duration::from_secs(5),
            healthmon_image: "alpine:3.20".to_string(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            platform: None,
            reconcile_interval: Duration::from_secs(5),
            reconnect: Backoff::default(),
            base_env: ServiceEnv::new(),
        }
    }
}
