//! Port probing: is a port free, who holds it, does it accept connections.

use crate::LOOPBACK_HOST;
use crate::error::LifecycleError;
use crate::process::describe_pid;

use common::ErrorLocation;

use std::io::ErrorKind;
use std::net::{IpAddr, TcpListener};
use std::panic::Location;
use std::time::{Duration, Instant};

use backoff::{ExponentialBackoff, backoff::Backoff};
use log::{debug, trace};
use netstat2::{
    AddressFamilyFlags, ProtocolFlags, ProtocolSocketInfo, SocketInfo, TcpState, get_sockets_info,
};
use tokio::net::TcpStream;
use tokio::time::{sleep as TokioSleep, timeout as TokioTimeout};

const PORT_RELEASE_INITIAL_INTERVAL: Duration = Duration::from_millis(25);
const LISTENER_POLL_INITIAL_INTERVAL: Duration = Duration::from_millis(50);
const LISTENER_POLL_MAX_INTERVAL: Duration = Duration::from_secs(1);
const LISTENER_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Host to dial when probing a server bound to `host`.
///
/// Wildcard binds (`0.0.0.0`, `::`) are reachable on loopback.
pub fn probe_host(host: &str) -> &str {
    match host.parse::<IpAddr>() {
        Ok(ip) if ip.is_unspecified() => LOOPBACK_HOST,
        _ => host,
    }
}

/// Whether `host` only ever reaches this machine (`localhost`, `127.0.0.0/8`, `::1`).
///
/// Wildcard binds are not loopback: they accept remote clients.
pub fn is_loopback_host(host: &str) -> bool {
    host.eq_ignore_ascii_case("localhost")
        || host
            .parse::<IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
}

/// Whether `host:port` can be bound right now.
pub fn is_available(host: &str, port: u16) -> bool {
    TcpListener::bind((host, port)).is_ok()
}

/// Fail with `PortUnavailable` unless `host:port` can be bound.
///
/// The probe listener is dropped before returning, so the port is free for
/// the server process to take.
#[track_caller]
pub fn ensure_available(host: &str, port: u16) -> Result<(), LifecycleError> {
    match TcpListener::bind((host, port)) {
        Ok(listener) => {
            drop(listener);
            trace!("Port {host}:{port} is free");
            Ok(())
        }
        Err(e) => {
            let reason = if e.kind() == ErrorKind::AddrInUse {
                match describe_listener(port) {
                    Some(holder) => format!("already in use by {holder}"),
                    None => String::from("already in use"),
                }
            } else {
                e.to_string()
            };

            debug!("Port {host}:{port} unavailable: {reason}");

            Err(LifecycleError::PortUnavailable {
                host: host.to_string(),
                port,
                reason,
                location: ErrorLocation::from(Location::caller()),
            })
        }
    }
}

/// Ask the OS for a free port on `host`.
///
/// The port is released before returning; another process may grab it in
/// between, so treat the result as a hint for tests and local runs.
#[track_caller]
pub fn allocate_port(host: &str) -> Result<u16, LifecycleError> {
    let location = ErrorLocation::from(Location::caller());

    let listener = TcpListener::bind((host, 0)).map_err(|e| LifecycleError::PortUnavailable {
        host: host.to_string(),
        port: 0,
        reason: format!("OS refused to assign a port: {e}"),
        location,
    })?;

    let port = listener
        .local_addr()
        .map_err(|e| LifecycleError::PortUnavailable {
            host: host.to_string(),
            port: 0,
            reason: format!("Could not read assigned port: {e}"),
            location,
        })?
        .port();

    debug!("Allocated free port {port} on {host}");
    Ok(port)
}

/// Wait until `host:port` can be bound again, for at most `grace`.
pub async fn wait_until_free(host: &str, port: u16, grace: Duration) -> bool {
    let mut backoff = ExponentialBackoff {
        current_interval: PORT_RELEASE_INITIAL_INTERVAL,
        initial_interval: PORT_RELEASE_INITIAL_INTERVAL,
        max_elapsed_time: Some(grace),
        ..Default::default()
    };

    loop {
        if is_available(host, port) {
            debug!("Port {host}:{port} released");
            return true;
        }

        match backoff.next_backoff() {
            Some(duration) => {
                trace!("Port {host}:{port} still bound, retrying after {duration:?}");
                TokioSleep(duration).await;
            }
            None => {
                debug!("Port {host}:{port} still bound after {grace:?}");
                return false;
            }
        }
    }
}

/// Single connection attempt against `host:port`.
///
/// # Returns
///
/// * `true` - If a TCP connection was established within `attempt_timeout`
/// * `false` - If the connect was refused, failed, or timed out
pub async fn accepts_connections(host: &str, port: u16, attempt_timeout: Duration) -> bool {
    let target = probe_host(host);

    match TokioTimeout(attempt_timeout, TcpStream::connect((target, port))).await {
        Ok(Ok(_stream)) => {
            trace!("Connected to {target}:{port}");
            true
        }
        Ok(Err(e)) => {
            trace!("Connect to {target}:{port} failed: {e}");
            false
        }
        Err(_) => {
            trace!("Connect to {target}:{port} timed out after {attempt_timeout:?}");
            false
        }
    }
}

/// Poll `host:port` until it accepts a connection, for at most `timeout`.
///
/// Used to probe servers this process does not own. Returns the time it
/// took for the listener to answer.
pub async fn wait_for_listener(
    host: &str,
    port: u16,
    timeout: Duration,
) -> Result<Duration, LifecycleError> {
    let location = ErrorLocation::from(Location::caller());
    let started = Instant::now();
    let mut backoff = ExponentialBackoff {
        current_interval: LISTENER_POLL_INITIAL_INTERVAL,
        initial_interval: LISTENER_POLL_INITIAL_INTERVAL,
        max_interval: LISTENER_POLL_MAX_INTERVAL,
        max_elapsed_time: None,
        ..Default::default()
    };

    loop {
        let remaining = timeout.saturating_sub(started.elapsed());
        let attempt = LISTENER_CONNECT_TIMEOUT.min(remaining).max(Duration::from_millis(1));

        if accepts_connections(host, port, attempt).await {
            return Ok(started.elapsed());
        }

        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(LifecycleError::ReadinessTimeout {
                host: host.to_string(),
                port,
                elapsed,
                location,
            });
        }

        let delay = backoff
            .next_backoff()
            .unwrap_or(LISTENER_POLL_MAX_INTERVAL)
            .min(timeout - elapsed);
        trace!("{host}:{port} not accepting connections, retrying after {delay:?}");
        TokioSleep(delay).await;
    }
}

fn query_tcp_sockets() -> Option<Vec<SocketInfo>> {
    get_sockets_info(
        AddressFamilyFlags::IPV4 | AddressFamilyFlags::IPV6,
        ProtocolFlags::TCP,
    )
    .map_err(|e| debug!("Failed to query network sockets: {e}"))
    .ok()
}

/// Name the process listening on `port`, if the socket table says.
pub fn describe_listener(port: u16) -> Option<String> {
    let sockets = query_tcp_sockets()?;

    for s in sockets {
        if let ProtocolSocketInfo::Tcp(tcp) = s.protocol_socket_info
            && tcp.state == TcpState::Listen
            && tcp.local_port == port
        {
            return match s.associated_pids.first() {
                Some(&pid) => {
                    trace!("Found process {pid} listening on port {port}");
                    Some(describe_pid(pid).unwrap_or_else(|| format!("PID {pid}")))
                }
                None => Some(String::from("a process owned by another user")),
            };
        }
    }

    None
}
