//! Lifecycle wrapper for an external forward-proxy daemon.
//!
//! The daemon (DeleGate by default) is configured entirely on its command
//! line and keyed by port: starting kills any instance already bound to the
//! port, and stopping asks the daemon on that port to exit. No proxy protocol
//! is spoken here.

use std::fmt::{self, Display, Formatter};
use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;
use crate::error::{HarnessError, HarnessResult};

const PROBE_INTERVAL: Duration = Duration::from_millis(50);
const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Protocol flavour the daemon is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyKind {
    /// SOCKS4.
    Socks4,
    /// SOCKS5 without authentication.
    Socks5,
    /// SOCKS5 with the fixed test credentials.
    Socks5Password,
    /// HTTP CONNECT without authentication.
    Http,
    /// HTTP CONNECT with the fixed test credentials.
    HttpPassword,
}

impl ProxyKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Socks4,
        Self::Socks5,
        Self::Socks5Password,
        Self::Http,
        Self::HttpPassword,
    ];

    /// Value of the daemon's `SERVER=` option.
    #[must_use]
    pub const fn server(self) -> &'static str {
        match self {
            Self::Socks4 => "socks4",
            Self::Socks5 | Self::Socks5Password => "socks5",
            Self::Http | Self::HttpPassword => "http",
        }
    }

    /// Whether clients must authenticate.
    #[must_use]
    pub const fn requires_auth(self) -> bool {
        matches!(self, Self::Socks5Password | Self::HttpPassword)
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Socks4 => "socks4",
            Self::Socks5 => "socks5",
            Self::Socks5Password => "socks5-pw",
            Self::Http => "http",
            Self::HttpPassword => "http-pw",
        }
    }
}

impl Display for ProxyKind {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.label())
    }
}

/// Error returned when a proxy kind label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown proxy kind '{0}'; expected socks4, socks5, socks5-pw, http or http-pw")]
pub struct UnknownProxyKind(pub String);

impl FromStr for ProxyKind {
    type Err = UnknownProxyKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownProxyKind(value.to_string()))
    }
}

/// Arguments that start a daemon on `port`.
#[must_use]
pub fn start_args(config: &ProxyConfig, port: u16, kind: ProxyKind) -> Vec<String> {
    let mut args = vec![
        format!("-P{port}"),
        format!("ADMIN={}", config.admin),
        "PERMIT=*:*:localhost".to_string(),
        "REMITTABLE=+,https".to_string(),
        "RELAY=proxy,delegate".to_string(),
        format!("SERVER={}", kind.server()),
    ];
    if kind.requires_auth() {
        args.push(format!(
            "AUTHORIZER=-list{{{}:{}}}",
            config.username, config.password
        ));
    }
    args
}

/// Arguments that stop the daemon on `port`.
#[must_use]
pub fn stop_args(port: u16) -> Vec<String> {
    vec![format!("-P{port}"), "-Fkill".to_string()]
}

/// A daemon started by [`start_proxy`]; dropping it stops the daemon.
pub struct ProxyFixture {
    port: u16,
    kind: ProxyKind,
    binary: PathBuf,
    child: Option<Child>,
    accepting: bool,
}

impl ProxyFixture {
    /// Port the daemon was started on.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.port
    }

    /// Configured protocol flavour.
    #[must_use]
    pub const fn kind(&self) -> ProxyKind {
        self.kind
    }

    /// Whether the port accepted a connection before the settle timeout.
    #[must_use]
    pub const fn accepting(&self) -> bool {
        self.accepting
    }

    /// Stop the daemon and reap the launcher process.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::ProxyCommand`] if the stop command cannot be run.
    pub fn stop(mut self) -> HarnessResult<()> {
        let result = run_stop(&self.binary, self.port);
        self.reap();
        result
    }

    fn reap(&mut self) {
        if let Some(mut child) = self.child.take() {
            if matches!(child.try_wait(), Ok(None)) {
                let _ = child.kill();
            }
            let _ = child.wait();
        }
    }
}

impl Drop for ProxyFixture {
    fn drop(&mut self) {
        if self.child.is_some() {
            if let Err(err) = run_stop(&self.binary, self.port) {
                warn!(port = self.port, error = %err, "failed to stop proxy on drop");
            }
            self.reap();
        }
    }
}

/// Stop whatever daemon listens on `port`.
///
/// # Errors
///
/// Returns [`HarnessError::ProxyCommand`] if the daemon binary cannot be run.
pub fn stop_proxy(config: &ProxyConfig, port: u16) -> HarnessResult<()> {
    run_stop(&config.binary, port)
}

fn run_stop(binary: &Path, port: u16) -> HarnessResult<()> {
    let status = Command::new(binary)
        .args(stop_args(port))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map_err(|source| HarnessError::ProxyCommand {
            operation: "stop",
            port,
            source,
        })?;
    debug!(port, success = status.success(), "proxy stop requested");
    Ok(())
}

/// Restart the daemon on `port` configured for `kind`.
///
/// Returns once the port accepts TCP connections or
/// `config.settle_timeout` elapses, whichever comes first.
///
/// # Errors
///
/// Returns [`HarnessError::ProxyCommand`] if the daemon binary cannot be run.
pub fn start_proxy(
    config: &ProxyConfig,
    port: u16,
    kind: ProxyKind,
) -> HarnessResult<ProxyFixture> {
    stop_proxy(config, port)?;

    let mut child = Command::new(&config.binary)
        .args(start_args(config, port, kind))
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| HarnessError::ProxyCommand {
            operation: "start",
            port,
            source,
        })?;
    // The daemon asks whether to run its interactive setup on first launch.
    if let Some(mut stdin) = child.stdin.take()
        && let Err(err) = stdin.write_all(b"n\n")
    {
        warn!(port, error = %err, "failed to answer proxy setup prompt");
    }

    let accepting = wait_for_port(port, config.settle_timeout);
    if accepting {
        info!(port, kind = %kind, "proxy accepting connections");
    } else {
        warn!(port, kind = %kind, timeout = ?config.settle_timeout, "proxy not accepting after settle timeout");
    }

    Ok(ProxyFixture {
        port,
        kind,
        binary: config.binary.clone(),
        child: Some(child),
        accepting,
    })
}

fn wait_for_port(port: u16, timeout: Duration) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    let deadline = Instant::now() + timeout;
    loop {
        if TcpStream::connect_timeout(&addr, PROBE_CONNECT_TIMEOUT).is_ok() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(PROBE_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn start_args_select_server_and_auth() {
        let config = ProxyConfig::default();
        let plain = start_args(&config, 4444, ProxyKind::Socks4);
        assert_eq!(
            plain,
            [
                "-P4444",
                "ADMIN=test@test.com",
                "PERMIT=*:*:localhost",
                "REMITTABLE=+,https",
                "RELAY=proxy,delegate",
                "SERVER=socks4",
            ]
        );

        let authed = start_args(&config, 4444, ProxyKind::HttpPassword);
        assert_eq!(authed[5], "SERVER=http");
        assert_eq!(authed[6], "AUTHORIZER=-list{testuser:testpass}");
        assert_eq!(
            start_args(&config, 1, ProxyKind::Socks5Password)[5],
            "SERVER=socks5"
        );
    }

    #[test]
    fn stop_args_kill_by_port() {
        assert_eq!(stop_args(8080), ["-P8080", "-Fkill"]);
    }

    #[test]
    fn kinds_round_trip_through_labels() -> Result<(), UnknownProxyKind> {
        for kind in ProxyKind::ALL {
            assert_eq!(kind.to_string().parse::<ProxyKind>()?, kind);
        }
        assert_eq!(
            "gopher".parse::<ProxyKind>(),
            Err(UnknownProxyKind("gopher".to_string()))
        );
        assert!(
            UnknownProxyKind("gopher".to_string())
                .to_string()
                .starts_with("unknown proxy kind 'gopher'")
        );
        Ok(())
    }

    #[test]
    fn missing_binary_is_reported() {
        let config = ProxyConfig {
            binary: PathBuf::from("/nonexistent/revaer-proxy-daemon"),
            settle_timeout: Duration::ZERO,
            ..ProxyConfig::default()
        };
        let result = start_proxy(&config, 4445, ProxyKind::Socks5);
        assert!(matches!(
            result,
            Err(HarnessError::ProxyCommand {
                operation: "stop",
                port: 4445,
                ..
            })
        ));
    }

    #[test]
    fn port_probe_sees_listener() -> std::io::Result<()> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        let port = listener.local_addr()?.port();
        assert!(wait_for_port(port, Duration::ZERO));
        drop(listener);
        assert!(!wait_for_port(port, Duration::ZERO));
        Ok(())
    }
}
