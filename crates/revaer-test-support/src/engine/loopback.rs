//! In-process engine double.
//!
//! Every [`LoopbackSession`] registers on a shared [`LoopbackNetwork`] under a
//! unique port on 127.0.0.1. Connecting two sessions exchanges metadata for
//! info-hash-only transfers and copies the payload from a complete side to an
//! incomplete one, emitting the events a real engine would. There is no wire
//! protocol and no hashing; the double exists so the harness can be exercised
//! without a native engine.

use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use uuid::Uuid;

use super::{
    AddTransfer, EngineEvent, EngineSession, EventMask, PeerId, SessionSettings, TransferHandle,
    TransferSource,
};
use crate::metainfo::{Descriptor, InfoHash};

const FIRST_PORT: u16 = 6881;

/// Shared registry the loopback sessions connect through.
#[derive(Clone, Default)]
pub struct LoopbackNetwork {
    state: Arc<Mutex<NetworkState>>,
}

#[derive(Default)]
struct NetworkState {
    next_port: u16,
    nodes: HashMap<u16, Arc<Mutex<Node>>>,
}

impl LoopbackNetwork {
    /// Empty network.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session listening on the next free port.
    ///
    /// # Errors
    ///
    /// Returns an error if the network registry lock is poisoned.
    pub fn session(&self) -> Result<LoopbackSession> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| anyhow!("loopback network mutex poisoned"))?;
        let port = if state.next_port == 0 {
            FIRST_PORT
        } else {
            state.next_port
        };
        state.next_port = port + 1;

        let peer_id = PeerId::random();
        let mut node = Node {
            peer_id,
            settings: SessionSettings::default(),
            mask: EventMask::all(),
            transfers: Vec::new(),
            events: Vec::new(),
        };
        node.push(EngineEvent::ListenSucceeded {
            endpoint: loopback_endpoint(port),
        });
        let node = Arc::new(Mutex::new(node));
        state.nodes.insert(port, Arc::clone(&node));

        Ok(LoopbackSession {
            network: self.clone(),
            node,
            port,
            peer_id,
        })
    }

    fn node(&self, port: u16) -> Result<Option<Arc<Mutex<Node>>>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow!("loopback network mutex poisoned"))?;
        Ok(state.nodes.get(&port).cloned())
    }
}

struct Node {
    peer_id: PeerId,
    settings: SessionSettings,
    mask: EventMask,
    transfers: Vec<Transfer>,
    events: Vec<EngineEvent>,
}

impl Node {
    fn push(&mut self, event: EngineEvent) {
        if self.mask.contains(event.category()) {
            self.events.push(event);
        }
    }

    fn transfer_by_id(&mut self, id: Uuid) -> Result<&mut Transfer> {
        self.transfers
            .iter_mut()
            .find(|transfer| transfer.handle.id == id)
            .ok_or_else(|| anyhow!("unknown transfer {id}"))
    }

    fn transfer_by_hash(&mut self, info_hash: InfoHash) -> Option<&mut Transfer> {
        self.transfers
            .iter_mut()
            .find(|transfer| transfer.handle.info_hash == info_hash)
    }
}

struct Transfer {
    handle: TransferHandle,
    descriptor: Option<Descriptor>,
    complete: bool,
    paused: bool,
    super_seeding: bool,
    peers: BTreeSet<u16>,
}

impl Transfer {
    /// Copy the payload from `source_root` and return the events the receiving
    /// side emits.
    fn complete_from(&mut self, source_root: &Path) -> Vec<EngineEvent> {
        let transfer = self.handle.id;
        let mut events = Vec::new();
        let Some(descriptor) = &self.descriptor else {
            return events;
        };
        let source = source_root.join(descriptor.name());
        let target_root = &self.handle.save_path;
        let copied = fs::create_dir_all(target_root)
            .and_then(|()| fs::copy(&source, target_root.join(descriptor.name())));
        if let Err(err) = copied {
            events.push(EngineEvent::TransferError {
                transfer,
                message: format!("failed to store payload: {err}"),
            });
            return events;
        }
        for piece in 0..descriptor.num_pieces() {
            events.push(EngineEvent::PieceFinished {
                transfer,
                piece: u32::try_from(piece).unwrap_or(u32::MAX),
            });
        }
        events.push(EngineEvent::TransferFinished { transfer });
        self.complete = true;
        events
    }
}

/// One engine instance on a [`LoopbackNetwork`].
pub struct LoopbackSession {
    network: LoopbackNetwork,
    node: Arc<Mutex<Node>>,
    port: u16,
    peer_id: PeerId,
}

impl LoopbackSession {
    fn lock(&self) -> Result<MutexGuard<'_, Node>> {
        lock_node(&self.node)
    }

    /// Queue an event as if the engine had emitted it.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn inject_event(&self, event: EngineEvent) -> Result<()> {
        self.lock()?.push(event);
        Ok(())
    }

    /// Settings most recently applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn settings(&self) -> Result<SessionSettings> {
        Ok(self.lock()?.settings)
    }

    /// Event mask most recently applied.
    ///
    /// # Errors
    ///
    /// Returns an error if the session lock is poisoned.
    pub fn event_mask(&self) -> Result<EventMask> {
        Ok(self.lock()?.mask)
    }

    /// Whether super-seeding is enabled on a transfer.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown transfer.
    pub fn is_super_seeding(&self, handle: &TransferHandle) -> Result<bool> {
        Ok(self.lock()?.transfer_by_id(handle.id)?.super_seeding)
    }

    /// Listen ports of the peers connected on a transfer.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown transfer.
    pub fn connected_ports(&self, handle: &TransferHandle) -> Result<Vec<u16>> {
        Ok(self
            .lock()?
            .transfer_by_id(handle.id)?
            .peers
            .iter()
            .copied()
            .collect())
    }
}

fn lock_node(node: &Mutex<Node>) -> Result<MutexGuard<'_, Node>> {
    node.lock()
        .map_err(|_| anyhow!("loopback session mutex poisoned"))
}

const fn loopback_endpoint(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)
}

/// What the initiating side learns from the accepting side of a connection.
struct Handshake {
    descriptor: Option<Descriptor>,
    complete: bool,
    save_path: PathBuf,
}

#[async_trait]
impl EngineSession for LoopbackSession {
    async fn apply_settings(&mut self, settings: &SessionSettings) -> Result<()> {
        self.lock()?.settings = *settings;
        Ok(())
    }

    async fn set_event_mask(&mut self, mask: EventMask) -> Result<()> {
        self.lock()?.mask = mask;
        Ok(())
    }

    async fn set_peer_id(&mut self, peer_id: PeerId) -> Result<()> {
        self.lock()?.peer_id = peer_id;
        self.peer_id = peer_id;
        Ok(())
    }

    fn peer_id(&self) -> PeerId {
        self.peer_id
    }

    fn listen_port(&self) -> Option<u16> {
        Some(self.port)
    }

    async fn add_transfer(&mut self, request: AddTransfer) -> Result<TransferHandle> {
        let info_hash = request.source.info_hash();
        let mut node = self.lock()?;
        if node.transfer_by_hash(info_hash).is_some() {
            return Err(anyhow!("transfer {info_hash} already added"));
        }

        let descriptor = match request.source {
            TransferSource::Descriptor(descriptor) => Some(descriptor),
            TransferSource::InfoHash(_) => None,
        };
        let on_disk = descriptor.as_ref().is_some_and(|descriptor| {
            fs::metadata(request.save_path.join(descriptor.name()))
                .is_ok_and(|meta| meta.len() == descriptor.total_length())
        });
        let complete =
            descriptor.is_some() && (request.options.seed_mode || on_disk);

        let handle = TransferHandle {
            id: Uuid::new_v4(),
            info_hash,
            save_path: request.save_path,
            seed_mode: request.options.seed_mode,
        };
        node.transfers.push(Transfer {
            handle: handle.clone(),
            descriptor,
            complete,
            paused: request.options.paused,
            super_seeding: false,
            peers: BTreeSet::new(),
        });
        Ok(handle)
    }

    async fn transfers(&mut self) -> Result<Vec<TransferHandle>> {
        Ok(self
            .lock()?
            .transfers
            .iter()
            .map(|transfer| transfer.handle.clone())
            .collect())
    }

    async fn set_super_seeding(&mut self, handle: &TransferHandle, enabled: bool) -> Result<()> {
        self.lock()?.transfer_by_id(handle.id)?.super_seeding = enabled;
        Ok(())
    }

    async fn connect_peer(&mut self, handle: &TransferHandle, peer: SocketAddr) -> Result<()> {
        let (own_descriptor, own_complete, own_paused, already_connected) = {
            let mut node = self.lock()?;
            let transfer = node.transfer_by_id(handle.id)?;
            (
                transfer.descriptor.clone(),
                transfer.complete,
                transfer.paused,
                transfer.peers.contains(&peer.port()),
            )
        };
        let own_endpoint = loopback_endpoint(self.port);

        let refuse = |message: &str| -> Result<()> {
            lock_node(&self.node)?.push(EngineEvent::PeerError {
                transfer: handle.id,
                peer,
                message: message.to_string(),
            });
            Ok(())
        };

        if peer.port() == self.port && peer.ip().is_loopback() {
            return refuse("closing connection to ourself");
        }
        let target = match self.network.node(peer.port())? {
            Some(target) if peer.ip().is_loopback() => target,
            _ => return refuse("Connection refused"),
        };
        if already_connected {
            return refuse("duplicate connection");
        }

        let handshake = {
            let mut remote = lock_node(&target)?;
            if remote.peer_id == self.peer_id {
                drop(remote);
                return refuse("duplicate peer-id, connection closed");
            }
            let allow_same_ip = remote.settings.allow_multiple_connections_per_ip;
            let Some(transfer) = remote.transfer_by_hash(handle.info_hash) else {
                drop(remote);
                lock_node(&self.node)?.push(EngineEvent::PeerDisconnected {
                    transfer: handle.id,
                    peer,
                    message: "invalid info-hash".to_string(),
                });
                return Ok(());
            };
            if !allow_same_ip && !transfer.peers.is_empty() {
                drop(remote);
                return refuse("too many connections from the same IP");
            }

            transfer.peers.insert(self.port);
            let mut remote_events = vec![EngineEvent::PeerConnected {
                transfer: transfer.handle.id,
                peer: own_endpoint,
            }];
            if transfer.descriptor.is_none() && own_descriptor.is_some() {
                transfer.descriptor.clone_from(&own_descriptor);
                remote_events.push(EngineEvent::MetadataReceived {
                    transfer: transfer.handle.id,
                });
            }
            if own_complete && !transfer.complete && !own_paused && !transfer.paused {
                remote_events.extend(transfer.complete_from(&handle.save_path));
            }
            let handshake = Handshake {
                descriptor: transfer.descriptor.clone(),
                complete: transfer.complete && !transfer.paused,
                save_path: transfer.handle.save_path.clone(),
            };
            for event in remote_events {
                remote.push(event);
            }
            handshake
        };

        let mut node = self.lock()?;
        let transfer = node.transfer_by_id(handle.id)?;
        transfer.peers.insert(peer.port());
        let mut own_events = vec![EngineEvent::PeerConnected {
            transfer: handle.id,
            peer,
        }];
        if transfer.descriptor.is_none() && handshake.descriptor.is_some() {
            transfer.descriptor = handshake.descriptor;
            own_events.push(EngineEvent::MetadataReceived {
                transfer: handle.id,
            });
        }
        if handshake.complete && !transfer.complete && !transfer.paused {
            own_events.extend(transfer.complete_from(&handshake.save_path));
        }
        for event in own_events {
            node.push(event);
        }
        Ok(())
    }

    async fn is_seed(&mut self, handle: &TransferHandle) -> Result<bool> {
        Ok(self.lock()?.transfer_by_id(handle.id)?.complete)
    }

    async fn poll_events(&mut self) -> Result<Vec<EngineEvent>> {
        Ok(std::mem::take(&mut self.lock()?.events))
    }
}
