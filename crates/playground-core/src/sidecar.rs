use std::{sync::Arc, time::Duration};

use tracing::{debug, info};

use playground_engine::ContainerSpec;
use playground_model::{LABEL_HEALTHMON, ProbeKind, ReadyCheck, Service};

use crate::{
    container,
    context::Context,
    error::{RunnerError, RunnerResult},
};

/// Quote `s` for POSIX `sh` unless it is plainly safe.
pub(crate) fn shell_quote(s: &str) -> String {
    let safe = !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@%+,".contains(c));
    if safe {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

fn secs(d: Duration) -> String {
    let ms = d.as_millis();
    if ms % 1000 == 0 {
        (ms / 1000).to_string()
    } else {
        format!("{}.{:03}", ms / 1000, ms % 1000)
    }
}

/// `sh -c` script that loops on the probe and exits 0 once it passes.
pub(crate) fn probe_script(probe: &ProbeKind, check: &ReadyCheck) -> String {
    // busybox wget and nc take whole seconds
    let timeout = check.timeout.as_secs().max(1);
    let attempt = match probe {
        ProbeKind::Http { url } => format!("wget -q -T {timeout} -O /dev/null {}", shell_quote(url)),
        ProbeKind::Tcp { host, port } => format!("nc -z -w {timeout} {} {port}", shell_quote(host)),
        ProbeKind::Exec { argv } => argv.iter().map(|a| shell_quote(a)).collect::<Vec<_>>().join(" "),
    };
    let wait = format!("until {attempt}; do sleep {}; done", secs(check.interval));
    if check.start_period.is_zero() {
        wait
    } else {
        format!("sleep {}; {wait}", secs(check.start_period))
    }
}

/// Engine request for the healthmon sidecar of `svc`, sharing the network
/// namespace of container `target`.
pub(crate) fn healthmon_spec(ctx: &Context, svc: &Service, target: &str, check: &ReadyCheck) -> RunnerResult<ContainerSpec> {
    let probe = check.probe().map_err(|reason| RunnerError::launch(&svc.name, reason))?;
    // Exec probes need the tools of the service image.
    let image = match &probe {
        ProbeKind::Exec { .. } => svc.image_ref().unwrap_or_else(|| ctx.cfg.healthmon_image.clone()),
        ProbeKind::Http { .. } | ProbeKind::Tcp { .. } => ctx.cfg.healthmon_image.clone(),
    };

    let mut labels = ctx.base_labels();
    labels.insert(LABEL_HEALTHMON.to_string(), svc.name.clone());

    Ok(ContainerSpec {
        name: format!("{}-healthmon", ctx.container_name(&svc.name)),
        image,
        entrypoint: Some(vec!["sh".to_string(), "-c".to_string()]),
        cmd: vec![probe_script(&probe, check)],
        labels,
        network_mode: Some(format!("container:{target}")),
        ..Default::default()
    })
}

/// Start the healthmon sidecar; its exit 0 is what marks `svc` healthy.
pub(crate) async fn launch_healthmon(ctx: &Arc<Context>, svc: &Service, target: &str, check: &ReadyCheck) -> RunnerResult<()> {
    let spec = healthmon_spec(ctx, svc, target, check)?;
    let id = container::create(ctx, svc, &spec).await?;
    ctx.record_sidecar(&svc.name, &id);
    debug!(target: "playground.core.sidecar", service = %svc.name, container = %id, "healthmon created");

    ctx.engine
        .start_container(&id)
        .await
        .map_err(|e| RunnerError::launch(&svc.name, format!("healthmon: {e}")))?;
    info!(target: "playground.core.sidecar", service = %svc.name, script = %spec.cmd[0], "healthmon started");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_leaves_safe_words_alone() {
        assert_eq!(shell_quote("http://localhost:8545/health"), "http://localhost:8545/health");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn http_probe_script() {
        let check = ReadyCheck::http("http://localhost:3500/eth/v1/node/health?syncing=true")
            .with_interval(Duration::from_millis(500))
            .with_timeout(Duration::from_secs(2));
        let probe = check.probe().unwrap();
        assert_eq!(
            probe_script(&probe, &check),
            "until wget -q -T 2 -O /dev/null 'http://localhost:3500/eth/v1/node/health?syncing=true'; do sleep 0.500; done"
        );
    }

    #[test]
    fn tcp_probe_script_with_start_period() {
        let check = ReadyCheck::tcp("localhost", 8551).with_start_period(Duration::from_secs(3));
        let probe = check.probe().unwrap();
        assert_eq!(
            probe_script(&probe, &check),
            "sleep 3; until nc -z -w 5 localhost 8551; do sleep 1; done"
        );
    }

    #[test]
    fn exec_probe_script_quotes_argv() {
        let check = ReadyCheck::new(["redis-cli", "-e", "ping me"]);
        let probe = check.probe().unwrap();
        assert_eq!(probe_script(&probe, &check), "until redis-cli -e 'ping me'; do sleep 1; done");
    }
}
