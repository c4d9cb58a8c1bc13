//! Swarm topology builder.
//!
//! Wires a seed, a leech and an optional third peer around one descriptor:
//! normalises settings, hands out fresh peer identities, admits the transfer
//! everywhere and connects the members to each other. Network trouble after
//! wiring is reported through the event drain, never through the return value.

use std::fs;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::config::{HarnessConfig, SWARM_PIECE_COUNT};
use crate::engine::{
    AddTransfer, AddTransferOptions, EngineSession, EventCategory, EventMask, PeerId,
    SessionSettings, TransferHandle, TransferSource,
};
use crate::error::{HarnessError, HarnessResult};
use crate::fixtures::{ContentFixture, payload_path};
use crate::metainfo::Descriptor;
use crate::report::CheckReport;

const LISTEN_POLL_INTERVAL: Duration = Duration::from_millis(10);
const DEFAULT_PIECE_SIZE: usize = 16 * 1024;

/// Engine instances taking part in one swarm.
pub struct SwarmMembers<'a> {
    /// Holds the complete payload from the start.
    pub seed: &'a mut dyn EngineSession,
    /// Downloads from the seed.
    pub leech: &'a mut dyn EngineSession,
    /// Optional plain leech connected to both others.
    pub third: Option<&'a mut dyn EngineSession>,
}

/// Where the swarm's descriptor comes from.
#[derive(Debug, Clone)]
pub enum ContentSource {
    /// Reuse a caller-supplied descriptor as-is; no payload is written.
    Existing(Descriptor),
    /// Synthesize a fixture under the seed's storage root.
    Synthesize {
        /// Bytes per piece.
        piece_size: usize,
    },
}

/// Knobs for [`setup_transfer`].
#[derive(Debug, Clone)]
pub struct SwarmOptions {
    /// Remove stale payloads from the non-seed roots before synthesizing.
    pub clear_files: bool,
    /// Add the leech by info-hash only so metadata travels over the wire.
    pub metadata_transfer: bool,
    /// Connect the members explicitly.
    pub connect_peers: bool,
    /// Enable super-seeding on the seed after it is added.
    pub super_seeding: bool,
    /// Appended to `tmp1`, `tmp2` and `tmp3` to form the storage roots.
    pub suffix: String,
    /// Options applied to every add; seed mode is overridden per member.
    pub template: AddTransferOptions,
    /// Descriptor source.
    pub content: ContentSource,
}

impl Default for SwarmOptions {
    fn default() -> Self {
        Self {
            clear_files: true,
            metadata_transfer: false,
            connect_peers: true,
            super_seeding: false,
            suffix: String::new(),
            template: AddTransferOptions::default(),
            content: ContentSource::Synthesize {
                piece_size: DEFAULT_PIECE_SIZE,
            },
        }
    }
}

/// Handles produced by [`setup_transfer`].
#[derive(Debug, Clone)]
pub struct SwarmTransfers {
    /// Seed's transfer.
    pub seed: TransferHandle,
    /// Leech's transfer.
    pub leech: TransferHandle,
    /// Third member's transfer, when one took part.
    pub third: Option<TransferHandle>,
    /// Descriptor shared by every member.
    pub descriptor: Descriptor,
}

/// Storage roots of the three members, in seed, leech, third order.
#[must_use]
pub fn storage_roots(work_dir: &Path, suffix: &str) -> [PathBuf; 3] {
    [1, 2, 3].map(|index| work_dir.join(format!("tmp{index}{suffix}")))
}

/// Build a swarm around one transfer.
///
/// Members whose listen socket never comes up within
/// `config.listen_ready_timeout` are recorded in `report` and skipped when
/// connecting.
///
/// # Errors
///
/// Returns an error when the engine rejects a configuration step or an add,
/// when the payload cannot be written, when seed and leech share a peer id,
/// or when seed or leech do not hold exactly one transfer after wiring.
pub async fn setup_transfer(
    members: SwarmMembers<'_>,
    options: &SwarmOptions,
    config: &HarnessConfig,
    report: &mut CheckReport,
) -> HarnessResult<SwarmTransfers> {
    let SwarmMembers {
        seed,
        leech,
        mut third,
    } = members;

    prepare_member("seed", seed).await?;
    prepare_member("leech", leech).await?;
    if let Some(third) = third.as_deref_mut() {
        prepare_member("third", third).await?;
    }

    let seed_id = seed.peer_id();
    if seed_id == leech.peer_id() {
        return Err(HarnessError::DuplicatePeerId {
            first: "seed",
            second: "leech",
            peer_id: seed_id,
        });
    }

    let [seed_root, leech_root, third_root] = storage_roots(&config.work_dir, &options.suffix);
    let descriptor = match &options.content {
        ContentSource::Existing(descriptor) => descriptor.clone(),
        ContentSource::Synthesize { piece_size } => {
            if options.clear_files {
                clear_payload(&leech_root);
                clear_payload(&third_root);
            }
            let descriptor =
                ContentFixture::new(*piece_size, SWARM_PIECE_COUNT).materialize(&seed_root)?;
            info!(
                info_hash = %descriptor.info_hash(),
                path = %payload_path(&seed_root).display(),
                "synthesized swarm payload"
            );
            descriptor
        }
    };

    let seeding = AddTransferOptions {
        seed_mode: true,
        ..options.template
    };
    let downloading = AddTransferOptions {
        seed_mode: false,
        ..options.template
    };

    let seed_handle = add(
        "seed",
        seed,
        TransferSource::Descriptor(descriptor.clone()),
        seed_root,
        seeding,
    )
    .await?;
    if options.super_seeding {
        seed.set_super_seeding(&seed_handle, true)
            .await
            .map_err(|err| HarnessError::engine("set_super_seeding", "seed", err))?;
    }

    let third_handle = match third.as_deref_mut() {
        Some(third) => Some(
            add(
                "third",
                third,
                TransferSource::Descriptor(descriptor.clone()),
                third_root,
                downloading,
            )
            .await?,
        ),
        None => None,
    };

    let leech_source = if options.metadata_transfer {
        TransferSource::InfoHash(descriptor.info_hash())
    } else {
        TransferSource::Descriptor(descriptor.clone())
    };
    let leech_handle = add("leech", leech, leech_source, leech_root, downloading).await?;

    expect_single_transfer("seed", seed).await?;
    expect_single_transfer("leech", leech).await?;

    let seed_port = await_listen_port("seed", seed, config.listen_ready_timeout, report).await;
    let leech_port = await_listen_port("leech", leech, config.listen_ready_timeout, report).await;

    if options.connect_peers {
        if let Some(port) = leech_port {
            connect("seed", seed, &seed_handle, port).await;
        }
        if let (Some(third), Some(handle)) = (third.as_deref_mut(), third_handle.as_ref())
            && await_listen_port("third", third, config.listen_ready_timeout, report)
                .await
                .is_some()
        {
            for port in [leech_port, seed_port].into_iter().flatten() {
                sleep(config.connect_stagger).await;
                connect("third", third, handle, port).await;
            }
        }
    }

    Ok(SwarmTransfers {
        seed: seed_handle,
        leech: leech_handle,
        third: third_handle,
        descriptor,
    })
}

async fn prepare_member(name: &'static str, session: &mut dyn EngineSession) -> HarnessResult<()> {
    session
        .apply_settings(&SessionSettings::swarm())
        .await
        .map_err(|err| HarnessError::engine("apply_settings", name, err))?;
    session
        .set_event_mask(EventMask::all().excluding(EventCategory::Progress))
        .await
        .map_err(|err| HarnessError::engine("set_event_mask", name, err))?;
    session
        .set_peer_id(PeerId::random())
        .await
        .map_err(|err| HarnessError::engine("set_peer_id", name, err))?;
    debug!(instance = name, peer_id = %session.peer_id(), "prepared swarm member");
    Ok(())
}

async fn add(
    name: &'static str,
    session: &mut dyn EngineSession,
    source: TransferSource,
    save_path: PathBuf,
    options: AddTransferOptions,
) -> HarnessResult<TransferHandle> {
    let handle = session
        .add_transfer(AddTransfer {
            source,
            save_path,
            options,
        })
        .await
        .map_err(|err| HarnessError::engine("add_transfer", name, err))?;
    debug!(
        instance = name,
        info_hash = %handle.info_hash,
        path = %handle.save_path.display(),
        "added transfer"
    );
    Ok(handle)
}

async fn expect_single_transfer(
    name: &'static str,
    session: &mut dyn EngineSession,
) -> HarnessResult<()> {
    let count = session
        .transfers()
        .await
        .map_err(|err| HarnessError::engine("transfers", name, err))?
        .len();
    if count == 1 {
        Ok(())
    } else {
        Err(HarnessError::UnexpectedTransferCount {
            instance: name,
            count,
        })
    }
}

async fn await_listen_port(
    name: &'static str,
    session: &dyn EngineSession,
    timeout: Duration,
    report: &mut CheckReport,
) -> Option<u16> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(port) = session.listen_port() {
            return Some(port);
        }
        if Instant::now() >= deadline {
            report.fail(format!("{name}: listen socket not ready after {timeout:?}"));
            return None;
        }
        sleep(LISTEN_POLL_INTERVAL).await;
    }
}

async fn connect(
    name: &'static str,
    session: &mut dyn EngineSession,
    handle: &TransferHandle,
    port: u16,
) {
    let peer = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port);
    if let Err(err) = session.connect_peer(handle, peer).await {
        warn!(instance = name, peer = %peer, error = %err, "connect request rejected");
    }
}

fn clear_payload(root: &Path) {
    let path = payload_path(root);
    match fs::remove_file(&path) {
        Ok(()) => debug!(path = %path.display(), "cleared stale payload"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to clear stale payload"),
    }
}
