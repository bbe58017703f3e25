use std::{
    collections::HashSet,
    net::{IpAddr, SocketAddr, TcpListener, UdpSocket},
};

use tracing::debug;

use playground_model::{Manifest, Protocol};

use crate::error::{RunnerError, RunnerResult};

const MAX_ATTEMPTS: usize = 64;

/// Probe-bind `addr` and release it right away; returns the bound port.
fn probe_bind(addr: SocketAddr, protocol: Protocol) -> std::io::Result<u16> {
    match protocol {
        Protocol::Tcp => TcpListener::bind(addr)?.local_addr().map(|a| a.port()),
        Protocol::Udp => UdpSocket::bind(addr)?.local_addr().map(|a| a.port()),
    }
}

/// Give every declared port a host port, unique across the session.
///
/// Explicit assignments are honored but must be free on `bind_ip`; the
/// rest get an ephemeral port obtained by binding port 0.
pub fn allocate_ports(manifest: &mut Manifest, bind_ip: IpAddr) -> RunnerResult<()> {
    let mut taken: HashSet<(u16, Protocol)> = manifest
        .services
        .iter()
        .flat_map(|s| s.ports.iter())
        .filter_map(|p| p.host_port.map(|h| (h, p.protocol)))
        .collect();

    for svc in &mut manifest.services {
        for port in &mut svc.ports {
            if let Some(host) = port.host_port {
                probe_bind(SocketAddr::new(bind_ip, host), port.protocol).map_err(|_| {
                    RunnerError::PortInUse {
                        service: svc.name.clone(),
                        name: port.name.clone(),
                        port: host,
                    }
                })?;
                continue;
            }

            let mut assigned = None;
            for _ in 0..MAX_ATTEMPTS {
                let candidate = probe_bind(SocketAddr::new(bind_ip, 0), port.protocol)
                    .map_err(|e| RunnerError::launch(&svc.name, format!("allocate port {}: {e}", port.name)))?;
                if taken.insert((candidate, port.protocol)) {
                    assigned = Some(candidate);
                    break;
                }
            }
            let host = assigned.ok_or_else(|| {
                RunnerError::launch(&svc.name, format!("no free host port for {}", port.name))
            })?;
            debug!(target: "playground.core.ports", service = %svc.name, port = %port.name, host, "host port assigned");
            port.host_port = Some(host);
        }
    }
    Ok(())
}
