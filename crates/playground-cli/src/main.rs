use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use playground_core::{Runner, RunnerConfig, clean, get_service_port};
use playground_engine::DockerEngine;
use playground_model::Manifest;
use playground_observe::{LogObserver, LoggerConfig, LoggerFormat, logger_init};

#[derive(Parser, Debug)]
#[command(name = "playground", version, about = "Run a local service graph on Docker")]
struct Cli {
    /// Log filter directive (`info`, `playground_core=debug,info`, ...).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,
    /// text | json | journald
    #[arg(long, global = true, default_value = "text")]
    log_format: LoggerFormat,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Bring a manifest up and keep it running until Ctrl-C.
    Start {
        /// Manifest JSON file.
        manifest: PathBuf,
        #[arg(long)]
        session: Option<String>,
        /// Seconds to wait for every service to become ready.
        #[arg(long, default_value_t = 120)]
        timeout: u64,
        /// Publish ports on all interfaces instead of loopback.
        #[arg(long)]
        bind_external: bool,
        /// Image platform, e.g. `linux/amd64`.
        #[arg(long)]
        platform: Option<String>,
        /// Leave stopped containers in place.
        #[arg(long)]
        keep_containers: bool,
    },
    /// Print the host port of a service port (all ports when omitted).
    Port {
        service: String,
        #[arg(default_value = "")]
        port: String,
        #[arg(long, default_value = "")]
        session: String,
    },
    /// Remove every container and network of a session (all sessions when omitted).
    Clean {
        #[arg(long)]
        session: Option<String>,
        /// Seconds a container gets to exit before it is killed.
        #[arg(long)]
        grace: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger_init(
        &LoggerConfig::default()
            .with_format(cli.log_format)
            .with_level(&cli.log_level),
    )?;

    match cli.command {
        Command::Start {
            manifest,
            session,
            timeout,
            bind_external,
            platform,
            keep_containers,
        } => {
            let mut cfg = RunnerConfig::default()
                .with_external_bind(bind_external)
                .with_remove_containers(!keep_containers);
            if let Some(session) = session {
                cfg = cfg.with_session(session);
            }
            if let Some(platform) = platform {
                cfg = cfg.with_platform(platform);
            }
            start(manifest, cfg, Duration::from_secs(timeout)).await
        }
        Command::Port {
            service,
            port,
            session,
        } => {
            let engine = connect().await?;
            let out = get_service_port(&engine, &session, &service, &port).await?;
            println!("{out}");
            Ok(())
        }
        Command::Clean { session, grace } => {
            let engine = connect().await?;
            let removed = clean(&engine, session.as_deref(), clean_grace(grace)).await?;
            info!(removed, session = session.as_deref().unwrap_or("*"), "cleaned");
            Ok(())
        }
    }
}

/// Same default as a runner's own teardown.
fn clean_grace(secs: Option<u64>) -> Duration {
    secs.map_or(RunnerConfig::default().stop_grace, Duration::from_secs)
}

async fn connect() -> Result<DockerEngine> {
    DockerEngine::connect()
        .await
        .context("connect to the container engine")
}

async fn load(path: &Path) -> Result<Manifest> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parse {}", path.display()))
}

async fn start(path: PathBuf, cfg: RunnerConfig, timeout: Duration) -> Result<()> {
    let manifest = load(&path).await?;
    let engine = Arc::new(connect().await?);
    let runner = Runner::new(manifest, engine, cfg)?;
    runner.subscribe(Arc::new(LogObserver::new()));

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            interrupt.cancel();
        }
    });

    // run and the readiness wait unwind on Ctrl-C; run tears down on its own errors
    runner.run(&cancel).await?;
    if let Err(e) = runner.wait_for_ready(timeout, &cancel).await {
        if let Err(td) = runner.stop().await {
            warn!(error = %td, "teardown incomplete");
        }
        return Err(e.into());
    }

    if let Some(resolved) = runner.manifest() {
        for svc in &resolved.services {
            for port in &svc.ports {
                if let Some(host_port) = port.host_port {
                    println!("{}.{}: {host_port}", svc.name, port.name);
                }
            }
        }
    }
    info!(
        session = runner.session(),
        dir = %runner.session_dir().map(|d| d.display().to_string()).unwrap_or_default(),
        "ready; press Ctrl-C to stop"
    );

    cancel.cancelled().await;
    info!("stopping");
    runner.stop().await?;
    Ok(())
}
