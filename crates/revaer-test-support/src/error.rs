//! # Design
//!
//! - Centralize harness error context for fixtures, swarms and servers.
//! - Keep error messages constant; store operational context in fields.
//! - Engine failures stay opaque (`anyhow`) because the engine is a collaborator.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use crate::engine::PeerId;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors raised by the harness itself (not by the engine under test).
#[derive(Debug, Error)]
pub enum HarnessError {
    /// A filesystem operation failed.
    #[error("harness filesystem operation failed")]
    Io {
        /// Operation that triggered the failure.
        operation: &'static str,
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Opening, binding or listening on a socket failed.
    #[error("failed to prepare listen socket")]
    Bind {
        /// Socket step that failed.
        operation: &'static str,
        /// Address the socket was meant to serve.
        addr: SocketAddr,
        /// Underlying IO error.
        source: io::Error,
    },
    /// A descriptor failed structural validation.
    #[error("invalid transfer descriptor")]
    Descriptor {
        /// Static reason describing the violation.
        reason: &'static str,
    },
    /// Encoding a descriptor failed.
    #[error("failed to encode transfer descriptor")]
    DescriptorEncode {
        /// Underlying bencode error.
        source: serde_bencode::Error,
    },
    /// Decoding a descriptor failed.
    #[error("failed to decode transfer descriptor")]
    DescriptorDecode {
        /// Underlying bencode error.
        source: serde_bencode::Error,
    },
    /// The engine under test rejected an operation.
    #[error("engine operation failed")]
    Engine {
        /// Operation that was attempted.
        operation: &'static str,
        /// Swarm member the operation targeted.
        instance: &'static str,
        /// Error reported by the engine.
        source: anyhow::Error,
    },
    /// Two swarm members ended up with the same peer identity.
    #[error("swarm members share a peer id")]
    DuplicatePeerId {
        /// First member name.
        first: &'static str,
        /// Second member name.
        second: &'static str,
        /// Identity both members reported.
        peer_id: PeerId,
    },
    /// A swarm member did not hold exactly one transfer after wiring.
    #[error("unexpected transfer count")]
    UnexpectedTransferCount {
        /// Member name.
        instance: &'static str,
        /// Number of transfers reported.
        count: usize,
    },
    /// Invoking the proxy daemon failed.
    #[error("proxy command failed")]
    ProxyCommand {
        /// Lifecycle step (`start` or `stop`).
        operation: &'static str,
        /// Port the proxy is keyed by.
        port: u16,
        /// Underlying IO error.
        source: io::Error,
    },
    /// An environment override could not be parsed.
    #[error("invalid environment override")]
    InvalidEnv {
        /// Variable name.
        name: &'static str,
        /// Offending value.
        value: String,
    },
    /// Protocol checks failed during the run.
    #[error("harness checks failed")]
    ChecksFailed {
        /// Number of recorded failures.
        count: usize,
    },
}

impl HarnessError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn engine(
        operation: &'static str,
        instance: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Self::Engine {
            operation,
            instance,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::net::{Ipv4Addr, SocketAddrV4};

    #[test]
    fn harness_error_display_and_source() {
        let addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0));
        let cases = vec![
            (
                HarnessError::io("write", "tmp1/temporary", io::Error::other("io")),
                "harness filesystem operation failed",
                true,
            ),
            (
                HarnessError::Bind {
                    operation: "bind",
                    addr,
                    source: io::Error::other("in use"),
                },
                "failed to prepare listen socket",
                true,
            ),
            (
                HarnessError::Descriptor {
                    reason: "piece hash list truncated",
                },
                "invalid transfer descriptor",
                false,
            ),
            (
                HarnessError::engine("add_transfer", "seed", anyhow::anyhow!("boom")),
                "engine operation failed",
                true,
            ),
            (
                HarnessError::UnexpectedTransferCount {
                    instance: "leech",
                    count: 2,
                },
                "unexpected transfer count",
                false,
            ),
            (
                HarnessError::ProxyCommand {
                    operation: "start",
                    port: 4444,
                    source: io::Error::other("missing"),
                },
                "proxy command failed",
                true,
            ),
            (
                HarnessError::InvalidEnv {
                    name: "REVAER_HARNESS_LISTEN_TIMEOUT_MS",
                    value: "soon".to_string(),
                },
                "invalid environment override",
                false,
            ),
            (
                HarnessError::ChecksFailed { count: 3 },
                "harness checks failed",
                false,
            ),
        ];

        for (err, message, has_source) in cases {
            assert_eq!(err.to_string(), message);
            assert_eq!(err.source().is_some(), has_source);
        }
    }
}
