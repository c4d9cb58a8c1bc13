//! Event drain and invariant checker.
//!
//! Pops everything an instance has queued, logs what is worth logging and
//! checks each event against the tolerance policy of the calling test.

use tracing::info;

use crate::engine::{EngineEvent, EngineSession};
use crate::error::{HarnessError, HarnessResult};
use crate::report::CheckReport;

/// Peer-error messages that are expected while peers race to connect.
pub const BENIGN_PEER_ERRORS: [&str; 4] = [
    "connecting to peer",
    "closing connection to ourself",
    "duplicate connection",
    "duplicate peer-id, connection closed",
];

/// Transport resets accepted only when the test tolerates disconnects.
pub const TRANSPORT_RESET_ERRORS: [&str; 3] = [
    "Broken pipe",
    "Connection reset by peer",
    "End of file.",
];

/// Predicate evaluated against every drained event.
pub type EventPredicate = dyn Fn(&EngineEvent) -> bool + Send + Sync;

/// What a test is willing to see in an instance's event queue.
#[derive(Clone, Copy, Default)]
pub struct DrainPolicy<'a> {
    /// Accept transport resets on peer connections.
    pub allow_disconnects: bool,
    /// Accept an instance that holds no transfer.
    pub allow_no_transfers: bool,
    /// Accept rejected fast-resume data.
    pub allow_failed_resume: bool,
    /// Custom match; the drain reports whether any event satisfied it.
    pub predicate: Option<&'a EventPredicate>,
}

impl<'a> DrainPolicy<'a> {
    /// Policy that tolerates transport resets.
    #[must_use]
    pub fn allowing_disconnects(mut self) -> Self {
        self.allow_disconnects = true;
        self
    }

    /// Policy with a custom predicate.
    #[must_use]
    pub fn matching(mut self, predicate: &'a EventPredicate) -> Self {
        self.predicate = Some(predicate);
        self
    }
}

/// Whether a peer error is acceptable under `policy` for a transfer whose
/// seeding state is `seeding`.
#[must_use]
pub fn peer_error_tolerated(message: &str, seeding: bool, policy: &DrainPolicy<'_>) -> bool {
    seeding
        || BENIGN_PEER_ERRORS.contains(&message)
        || (policy.allow_disconnects && TRANSPORT_RESET_ERRORS.contains(&message))
}

/// Drain every pending event of `session`, recording violations in `report`.
///
/// Returns whether the policy predicate matched any drained event.
///
/// # Errors
///
/// Returns an error only when the engine cannot list transfers or pop
/// events; check violations go to `report`.
pub async fn drain_events(
    session: &mut dyn EngineSession,
    name: &str,
    policy: &DrainPolicy<'_>,
    report: &mut CheckReport,
) -> HarnessResult<bool> {
    let transfers = session
        .transfers()
        .await
        .map_err(|err| HarnessError::engine("transfers", "drain", err))?;
    report.check(
        !transfers.is_empty() || policy.allow_no_transfers,
        format!("{name}: no transfers"),
    );
    let seeding = match transfers.first() {
        Some(handle) => session
            .is_seed(handle)
            .await
            .map_err(|err| HarnessError::engine("is_seed", "drain", err))?,
        None => false,
    };

    let events = session
        .poll_events()
        .await
        .map_err(|err| HarnessError::engine("poll_events", "drain", err))?;

    let mut matched = false;
    for event in &events {
        if policy.predicate.is_some_and(|predicate| predicate(event)) {
            matched = true;
        }
        log_event(name, event);
        check_event(name, event, seeding, policy, report);
    }
    Ok(matched)
}

fn log_event(name: &str, event: &EngineEvent) {
    match event {
        EngineEvent::PeerDisconnected { peer, message, .. } => {
            info!(instance = name, peer = %peer, "{message}");
        }
        other if other.is_routine_progress() => {}
        other => info!(instance = name, kind = other.kind(), "{}", other.message()),
    }
}

fn check_event(
    name: &str,
    event: &EngineEvent,
    seeding: bool,
    policy: &DrainPolicy<'_>,
    report: &mut CheckReport,
) {
    match event {
        EngineEvent::FastResumeRejected { message, .. } => {
            report.check(
                policy.allow_failed_resume,
                format!("{name}: fast resume rejected: {message}"),
            );
        }
        EngineEvent::PeerError { peer, message, .. } => {
            report.check(
                peer_error_tolerated(message, seeding, policy),
                format!("{name}: peer error from {peer}: {message}"),
            );
        }
        EngineEvent::ListenSucceeded { .. }
        | EngineEvent::PeerConnected { .. }
        | EngineEvent::PeerDisconnected { .. }
        | EngineEvent::MetadataReceived { .. }
        | EngineEvent::BlockDownloading { .. }
        | EngineEvent::BlockFinished { .. }
        | EngineEvent::PieceFinished { .. }
        | EngineEvent::TransferFinished { .. }
        | EngineEvent::TrackerError { .. }
        | EngineEvent::TransferError { .. } => {}
    }
}
