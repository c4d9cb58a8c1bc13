//! Events queued by an engine instance and the masks that filter them.

use std::net::SocketAddr;

use uuid::Uuid;

/// Coarse grouping used to mask which events an instance queues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventCategory {
    /// Failures of any kind.
    Error,
    /// Peer connection lifecycle.
    Peer,
    /// Transfer and listen-socket state changes.
    Status,
    /// Block and piece progress.
    Progress,
    /// Tracker announces.
    Tracker,
}

impl EventCategory {
    const fn bit(self) -> u8 {
        match self {
            Self::Error => 1,
            Self::Peer => 1 << 1,
            Self::Status => 1 << 2,
            Self::Progress => 1 << 3,
            Self::Tracker => 1 << 4,
        }
    }
}

/// Set of event categories an instance is allowed to queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventMask(u8);

impl EventMask {
    /// Every category.
    #[must_use]
    pub const fn all() -> Self {
        Self(0b1_1111)
    }

    /// Copy of the mask with one category removed.
    #[must_use]
    pub const fn excluding(self, category: EventCategory) -> Self {
        Self(self.0 & !category.bit())
    }

    /// Whether events of `category` pass the mask.
    #[must_use]
    pub const fn contains(self, category: EventCategory) -> bool {
        self.0 & category.bit() != 0
    }
}

impl Default for EventMask {
    fn default() -> Self {
        Self::all()
    }
}

/// Asynchronous notification emitted by an engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// The listen socket was bound.
    ListenSucceeded {
        /// Bound endpoint.
        endpoint: SocketAddr,
    },
    /// A peer connection completed its handshake.
    PeerConnected {
        /// Transfer the connection belongs to.
        transfer: Uuid,
        /// Remote endpoint.
        peer: SocketAddr,
    },
    /// A peer connection was closed.
    PeerDisconnected {
        /// Transfer the connection belonged to.
        transfer: Uuid,
        /// Remote endpoint.
        peer: SocketAddr,
        /// Close reason.
        message: String,
    },
    /// A peer connection failed.
    PeerError {
        /// Transfer the connection belongs to.
        transfer: Uuid,
        /// Remote endpoint.
        peer: SocketAddr,
        /// Failure description.
        message: String,
    },
    /// Metadata was fetched from a peer for an info-hash-only transfer.
    MetadataReceived {
        /// Transfer that received metadata.
        transfer: Uuid,
    },
    /// A block request was sent.
    BlockDownloading {
        /// Transfer identifier.
        transfer: Uuid,
        /// Piece index.
        piece: u32,
        /// Block index within the piece.
        block: u32,
    },
    /// A block was received.
    BlockFinished {
        /// Transfer identifier.
        transfer: Uuid,
        /// Piece index.
        piece: u32,
        /// Block index within the piece.
        block: u32,
    },
    /// A piece passed its hash check.
    PieceFinished {
        /// Transfer identifier.
        transfer: Uuid,
        /// Piece index.
        piece: u32,
    },
    /// Every piece of the transfer is present.
    TransferFinished {
        /// Transfer identifier.
        transfer: Uuid,
    },
    /// Stored resume data did not match the payload on disk.
    FastResumeRejected {
        /// Transfer identifier.
        transfer: Uuid,
        /// Rejection reason.
        message: String,
    },
    /// A tracker announce failed.
    TrackerError {
        /// Transfer identifier.
        transfer: Uuid,
        /// Announce URL.
        url: String,
        /// Failure description.
        message: String,
    },
    /// Storage or other transfer-level failure.
    TransferError {
        /// Transfer identifier.
        transfer: Uuid,
        /// Failure description.
        message: String,
    },
}

impl EngineEvent {
    /// Machine-friendly discriminator for log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ListenSucceeded { .. } => "listen_succeeded",
            Self::PeerConnected { .. } => "peer_connected",
            Self::PeerDisconnected { .. } => "peer_disconnected",
            Self::PeerError { .. } => "peer_error",
            Self::MetadataReceived { .. } => "metadata_received",
            Self::BlockDownloading { .. } => "block_downloading",
            Self::BlockFinished { .. } => "block_finished",
            Self::PieceFinished { .. } => "piece_finished",
            Self::TransferFinished { .. } => "transfer_finished",
            Self::FastResumeRejected { .. } => "fast_resume_rejected",
            Self::TrackerError { .. } => "tracker_error",
            Self::TransferError { .. } => "transfer_error",
        }
    }

    /// Category used for masking.
    #[must_use]
    pub const fn category(&self) -> EventCategory {
        match self {
            Self::ListenSucceeded { .. }
            | Self::MetadataReceived { .. }
            | Self::TransferFinished { .. } => EventCategory::Status,
            Self::PeerConnected { .. } | Self::PeerDisconnected { .. } => EventCategory::Peer,
            Self::PeerError { .. }
            | Self::FastResumeRejected { .. }
            | Self::TransferError { .. } => EventCategory::Error,
            Self::BlockDownloading { .. }
            | Self::BlockFinished { .. }
            | Self::PieceFinished { .. } => EventCategory::Progress,
            Self::TrackerError { .. } => EventCategory::Tracker,
        }
    }

    /// Block and piece bookkeeping that is too chatty to log.
    #[must_use]
    pub const fn is_routine_progress(&self) -> bool {
        matches!(
            self,
            Self::BlockDownloading { .. } | Self::BlockFinished { .. } | Self::PieceFinished { .. }
        )
    }

    /// Human-readable description, matching what the engine would print.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::ListenSucceeded { endpoint } => format!("successfully listening on {endpoint}"),
            Self::PeerConnected { .. } => "peer connected".to_string(),
            Self::PeerDisconnected { message, .. }
            | Self::PeerError { message, .. }
            | Self::FastResumeRejected { message, .. }
            | Self::TransferError { message, .. } => message.clone(),
            Self::MetadataReceived { .. } => "metadata successfully received".to_string(),
            Self::BlockDownloading { .. } => "block downloading".to_string(),
            Self::BlockFinished { .. } => "block finished".to_string(),
            Self::PieceFinished { .. } => "piece finished".to_string(),
            Self::TransferFinished { .. } => "transfer finished downloading".to_string(),
            Self::TrackerError { url, message, .. } => format!("{url}: {message}"),
        }
    }
}
