//! Harness configuration with environment overrides.
//!
//! # Design
//! - `Default` yields the values the fixtures were written against.
//! - `from_env` overlays `REVAER_HARNESS_*` variables; lookups go through a
//!   closure so parsing is testable without touching the process env.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Parent directory of the per-member storage roots.
pub const ENV_WORK_DIR: &str = "REVAER_HARNESS_WORK_DIR";
/// Upper bound on waiting for an instance's listen socket, in milliseconds.
pub const ENV_LISTEN_TIMEOUT_MS: &str = "REVAER_HARNESS_LISTEN_TIMEOUT_MS";
/// Delay between successive peer connects, in milliseconds.
pub const ENV_CONNECT_STAGGER_MS: &str = "REVAER_HARNESS_CONNECT_STAGGER_MS";
/// Directory the origin double serves files from.
pub const ENV_ORIGIN_ROOT: &str = "REVAER_HARNESS_ORIGIN_ROOT";
/// Largest file the origin double serves, in bytes.
pub const ENV_ORIGIN_MAX_FILE: &str = "REVAER_HARNESS_ORIGIN_MAX_FILE";
/// Proxy daemon executable.
pub const ENV_PROXY_BIN: &str = "REVAER_HARNESS_PROXY_BIN";
/// Upper bound on waiting for the proxy daemon, in milliseconds.
pub const ENV_PROXY_SETTLE_MS: &str = "REVAER_HARNESS_PROXY_SETTLE_MS";

/// Pieces in a synthesized swarm payload.
pub const SWARM_PIECE_COUNT: usize = 19;

/// Settings for the origin HTTP double.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OriginConfig {
    /// Directory request paths are resolved against.
    pub root: PathBuf,
    /// Files larger than this are answered with 503.
    pub max_file_size: u64,
}

impl Default for OriginConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            max_file_size: 8_000_000,
        }
    }
}

/// Settings for the forward proxy fixture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    /// Daemon executable, resolved through `PATH`.
    pub binary: PathBuf,
    /// Administrator address the daemon insists on.
    pub admin: String,
    /// User name for authenticated proxy kinds.
    pub username: String,
    /// Password for authenticated proxy kinds.
    pub password: String,
    /// How long `start` waits for the port to accept connections.
    pub settle_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("delegated"),
            admin: "test@test.com".to_string(),
            username: "testuser".to_string(),
            password: "testpass".to_string(),
            settle_timeout: Duration::from_millis(1000),
        }
    }
}

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Parent of `tmp1<suffix>`, `tmp2<suffix>` and `tmp3<suffix>`.
    pub work_dir: PathBuf,
    /// Upper bound on waiting for a swarm member's listen port.
    pub listen_ready_timeout: Duration,
    /// Delay between successive peer connects.
    pub connect_stagger: Duration,
    /// Origin double settings.
    pub origin: OriginConfig,
    /// Proxy fixture settings.
    pub proxy: ProxyConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from("."),
            listen_ready_timeout: Duration::from_millis(2000),
            connect_stagger: Duration::from_millis(100),
            origin: OriginConfig::default(),
            proxy: ProxyConfig::default(),
        }
    }
}

impl HarnessConfig {
    /// Defaults overlaid with `REVAER_HARNESS_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidEnv`] when a numeric override does not
    /// parse.
    pub fn from_env() -> HarnessResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with values returned by `lookup`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidEnv`] when a numeric override does not
    /// parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> HarnessResult<Self> {
        let mut config = Self::default();
        if let Some(dir) = lookup(ENV_WORK_DIR) {
            config.work_dir = PathBuf::from(dir);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_LISTEN_TIMEOUT_MS)? {
            config.listen_ready_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_CONNECT_STAGGER_MS)? {
            config.connect_stagger = Duration::from_millis(ms);
        }
        if let Some(root) = lookup(ENV_ORIGIN_ROOT) {
            config.origin.root = PathBuf::from(root);
        }
        if let Some(bytes) = parse_var(&lookup, ENV_ORIGIN_MAX_FILE)? {
            config.origin.max_file_size = bytes;
        }
        if let Some(binary) = lookup(ENV_PROXY_BIN) {
            config.proxy.binary = PathBuf::from(binary);
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_PROXY_SETTLE_MS)? {
            config.proxy.settle_timeout = Duration::from_millis(ms);
        }
        Ok(config)
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> HarnessResult<Option<T>> {
    lookup(name)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| HarnessError::InvalidEnv { name, value })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_defaults() -> HarnessResult<()> {
        let config = HarnessConfig::from_lookup(|_| None)?;
        assert_eq!(config, HarnessConfig::default());
        assert_eq!(config.origin.max_file_size, 8_000_000);
        assert_eq!(config.proxy.admin, "test@test.com");
        Ok(())
    }

    #[test]
    fn overrides_are_applied() -> HarnessResult<()> {
        let config = HarnessConfig::from_lookup(lookup_from(&[
            (ENV_WORK_DIR, "/tmp/harness"),
            (ENV_LISTEN_TIMEOUT_MS, "50"),
            (ENV_CONNECT_STAGGER_MS, " 0 "),
            (ENV_ORIGIN_ROOT, "srv"),
            (ENV_ORIGIN_MAX_FILE, "1024"),
            (ENV_PROXY_BIN, "/opt/delegate/delegated"),
            (ENV_PROXY_SETTLE_MS, "250"),
        ]))?;
        assert_eq!(config.work_dir, PathBuf::from("/tmp/harness"));
        assert_eq!(config.listen_ready_timeout, Duration::from_millis(50));
        assert_eq!(config.connect_stagger, Duration::ZERO);
        assert_eq!(config.origin.root, PathBuf::from("srv"));
        assert_eq!(config.origin.max_file_size, 1024);
        assert_eq!(config.proxy.binary, PathBuf::from("/opt/delegate/delegated"));
        assert_eq!(config.proxy.settle_timeout, Duration::from_millis(250));
        Ok(())
    }

    #[test]
    fn non_numeric_override_is_rejected() {
        let result = HarnessConfig::from_lookup(lookup_from(&[(ENV_ORIGIN_MAX_FILE, "lots")]));
        assert!(matches!(
            result,
            Err(HarnessError::InvalidEnv { name, ref value })
                if name == ENV_ORIGIN_MAX_FILE && value == "lots"
        ));
    }
}
