//! Surface of the engine under test as seen by the harness.
//!
//! The harness never reaches into the engine: it adds transfers, connects
//! peers, lists transfers and pops events through [`EngineSession`]. Adapters
//! for concrete engines implement the trait; [`loopback`] provides an
//! in-process implementation used to exercise the harness on its own.

use std::fmt::{self, Display, Formatter};
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::metainfo::{Descriptor, InfoHash};

mod event;
pub mod loopback;

pub use event::{EngineEvent, EventCategory, EventMask};

/// 20-byte identity an engine instance presents to its peers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub [u8; 20]);

impl PeerId {
    /// Draw a fresh identity from the thread-local RNG.
    #[must_use]
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl Display for PeerId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.0))
    }
}

/// Session-wide knobs the harness normalises before wiring a swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    /// Accept more than one connection from the same source address.
    pub allow_multiple_connections_per_ip: bool,
    /// Exempt local-network peers from rate and connection limits.
    pub ignore_limits_on_local_network: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            allow_multiple_connections_per_ip: false,
            ignore_limits_on_local_network: true,
        }
    }
}

impl SessionSettings {
    /// Settings applied to every swarm member: all members share 127.0.0.1 and
    /// must be subject to the same limits as remote peers.
    #[must_use]
    pub const fn swarm() -> Self {
        Self {
            allow_multiple_connections_per_ip: true,
            ignore_limits_on_local_network: false,
        }
    }
}

/// Where a transfer's metadata comes from.
#[derive(Debug, Clone)]
pub enum TransferSource {
    /// Full descriptor supplied up front.
    Descriptor(Descriptor),
    /// Only the info-hash; metadata must be fetched from peers.
    InfoHash(InfoHash),
}

impl TransferSource {
    /// Info-hash identifying the transfer regardless of the source kind.
    #[must_use]
    pub fn info_hash(&self) -> InfoHash {
        match self {
            Self::Descriptor(descriptor) => descriptor.info_hash(),
            Self::InfoHash(hash) => *hash,
        }
    }
}

/// Per-add knobs; used as a template the swarm builder copies for every member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AddTransferOptions {
    /// Assume the payload is complete on disk and skip the hash check.
    pub seed_mode: bool,
    /// Add the transfer without starting it.
    pub paused: bool,
}

/// Request to admit a transfer into an engine instance.
#[derive(Debug, Clone)]
pub struct AddTransfer {
    /// Metadata source.
    pub source: TransferSource,
    /// Storage root for the payload.
    pub save_path: PathBuf,
    /// Optional knobs.
    pub options: AddTransferOptions,
}

/// Per-instance reference to an admitted transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferHandle {
    /// Engine-local identifier.
    pub id: Uuid,
    /// Info-hash of the shared descriptor.
    pub info_hash: InfoHash,
    /// Storage root of this instance's copy.
    pub save_path: PathBuf,
    /// Whether the transfer was admitted in seed mode.
    pub seed_mode: bool,
}

/// Operations the harness needs from one running engine instance.
#[async_trait]
pub trait EngineSession: Send {
    /// Replace the session settings.
    async fn apply_settings(&mut self, settings: &SessionSettings) -> Result<()>;
    /// Restrict which event categories the instance queues.
    async fn set_event_mask(&mut self, mask: EventMask) -> Result<()>;
    /// Replace the peer identity.
    async fn set_peer_id(&mut self, peer_id: PeerId) -> Result<()>;
    /// Current peer identity.
    fn peer_id(&self) -> PeerId;
    /// Port the instance accepts peers on, once its listen socket is bound.
    fn listen_port(&self) -> Option<u16>;
    /// Admit a transfer.
    async fn add_transfer(&mut self, request: AddTransfer) -> Result<TransferHandle>;
    /// Transfers currently held by the instance.
    async fn transfers(&mut self) -> Result<Vec<TransferHandle>>;
    /// Toggle super-seeding on a transfer.
    async fn set_super_seeding(&mut self, handle: &TransferHandle, enabled: bool) -> Result<()>;
    /// Initiate a peer connection for a transfer.
    async fn connect_peer(&mut self, handle: &TransferHandle, peer: SocketAddr) -> Result<()>;
    /// Whether the instance holds the complete payload of a transfer.
    async fn is_seed(&mut self, handle: &TransferHandle) -> Result<bool>;
    /// Pop every pending event without waiting for new ones.
    async fn poll_events(&mut self) -> Result<Vec<EngineEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_peer_ids_differ() {
        assert_ne!(PeerId::random(), PeerId::random());
    }

    #[test]
    fn peer_id_displays_as_hex() {
        let id = PeerId([0xab; 20]);
        assert_eq!(id.to_string(), "ab".repeat(20));
    }

    #[test]
    fn swarm_settings_differ_from_engine_defaults() {
        let defaults = SessionSettings::default();
        let swarm = SessionSettings::swarm();
        assert!(!defaults.allow_multiple_connections_per_ip);
        assert!(swarm.allow_multiple_connections_per_ip);
        assert!(!swarm.ignore_limits_on_local_network);
    }
}
