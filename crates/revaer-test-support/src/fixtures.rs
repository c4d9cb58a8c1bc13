//! Deterministic content fixtures and their descriptors.
//!
//! The payload is the alphabet repeated: byte `i` of every piece is
//! `b'A' + i % 26`, so every piece is bit-identical and a single digest is
//! reused for the whole hash list.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use sha1::{Digest, Sha1};

use crate::error::{HarnessError, HarnessResult};
use crate::metainfo::{Descriptor, HASH_LEN};

/// Resolvable-looking tracker that never answers.
pub const ANNOUNCE_UNRESOLVABLE: &str = "http://non-existent-name.com/announce";
/// Tracker URL with no host.
pub const ANNOUNCE_MALFORMED: &str = "http:";
/// Tracker URL with a scheme no engine supports.
pub const ANNOUNCE_UNSUPPORTED_SCHEME: &str = "foo://non/existent-name.com/announce";
/// File name of the single payload file.
pub const PAYLOAD_FILE_NAME: &str = "temporary";

/// Immutable synthetic payload description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentFixture {
    piece: Vec<u8>,
    piece_count: usize,
    piece_hash: [u8; HASH_LEN],
}

impl ContentFixture {
    /// Build a fixture of `piece_count` pieces of `piece_size` bytes.
    ///
    /// Both values must be positive.
    #[must_use]
    pub fn new(piece_size: usize, piece_count: usize) -> Self {
        let piece = piece_pattern(piece_size);
        // Pieces are identical, so one digest stands in for all of them.
        let piece_hash = Sha1::digest(&piece).into();
        Self {
            piece,
            piece_count,
            piece_hash,
        }
    }

    /// Bytes per piece.
    #[must_use]
    pub fn piece_size(&self) -> usize {
        self.piece.len()
    }

    /// Number of pieces.
    #[must_use]
    pub const fn piece_count(&self) -> usize {
        self.piece_count
    }

    /// Total payload size in bytes.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.piece.len() * self.piece_count
    }

    /// Content of every piece.
    #[must_use]
    pub fn piece(&self) -> &[u8] {
        &self.piece
    }

    /// Hash list, one entry per piece.
    #[must_use]
    pub fn piece_hashes(&self) -> Vec<[u8; HASH_LEN]> {
        vec![self.piece_hash; self.piece_count]
    }

    /// Announce endpoints attached to the descriptor.
    #[must_use]
    pub const fn trackers() -> [&'static str; 3] {
        [
            ANNOUNCE_UNRESOLVABLE,
            ANNOUNCE_MALFORMED,
            ANNOUNCE_UNSUPPORTED_SCHEME,
        ]
    }

    /// Stream the full payload into `sink`.
    ///
    /// # Errors
    ///
    /// Propagates write failures from the sink.
    pub fn write_payload(&self, sink: &mut dyn Write) -> std::io::Result<()> {
        for _ in 0..self.piece_count {
            sink.write_all(&self.piece)?;
        }
        sink.flush()
    }

    /// Encode the descriptor for this fixture.
    ///
    /// # Errors
    ///
    /// Returns an error if the descriptor cannot be encoded.
    pub fn descriptor(&self) -> HarnessResult<Descriptor> {
        Descriptor::encode(
            PAYLOAD_FILE_NAME,
            self.piece.len() as u64,
            self.total_size() as u64,
            &self.piece_hashes(),
            &Self::trackers(),
        )
    }

    /// Write the payload as `<root>/temporary` and return the descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or payload file cannot be written.
    pub fn materialize(&self, root: &Path) -> HarnessResult<Descriptor> {
        fs::create_dir_all(root).map_err(|err| HarnessError::io("create_dir", root, err))?;
        let path = payload_path(root);
        let file = File::create(&path).map_err(|err| HarnessError::io("create", &path, err))?;
        let mut writer = BufWriter::new(file);
        self.write_payload(&mut writer)
            .map_err(|err| HarnessError::io("write", &path, err))?;
        self.descriptor()
    }
}

/// One piece of the repeating 26-symbol pattern.
#[must_use]
pub fn piece_pattern(piece_size: usize) -> Vec<u8> {
    (b'A'..=b'Z').cycle().take(piece_size).collect()
}

/// Location of the payload file under a storage root.
#[must_use]
pub fn payload_path(root: &Path) -> PathBuf {
    root.join(PAYLOAD_FILE_NAME)
}

/// Build a descriptor, optionally streaming the payload to `sink` first.
///
/// # Errors
///
/// Returns an error if writing to the sink or encoding fails.
pub fn create_descriptor(
    sink: Option<&mut dyn Write>,
    piece_size: usize,
    piece_count: usize,
) -> HarnessResult<Descriptor> {
    let fixture = ContentFixture::new(piece_size, piece_count);
    if let Some(sink) = sink {
        fixture
            .write_payload(sink)
            .map_err(|err| HarnessError::io("write", PAYLOAD_FILE_NAME, err))?;
    }
    fixture.descriptor()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn pattern_cycles_through_the_alphabet() {
        let piece = piece_pattern(30);
        assert_eq!(&piece[..3], b"ABC");
        assert_eq!(piece[25], b'Z');
        assert_eq!(&piece[26..], b"ABCD");
        assert_eq!(piece.len(), 30);
    }

    #[test]
    fn descriptor_covers_every_piece() -> HarnessResult<()> {
        for (piece_size, piece_count) in [(1, 1), (16, 19), (1024, 3), (16 * 1024, 7)] {
            let descriptor = create_descriptor(None, piece_size, piece_count)?;
            let reparsed = Descriptor::from_bytes(descriptor.as_bytes())?;
            assert_eq!(reparsed.num_pieces(), piece_count);
            assert_eq!(
                reparsed.total_length(),
                (piece_size * piece_count) as u64
            );
            assert_eq!(reparsed.piece_length(), piece_size as u64);
            assert!(reparsed.piece_hashes().iter().all(|hash| hash.len() == HASH_LEN));
        }
        Ok(())
    }

    #[test]
    fn every_piece_hash_matches_the_pattern_digest() -> HarnessResult<()> {
        let fixture = ContentFixture::new(64, 5);
        let expected: [u8; HASH_LEN] = Sha1::digest(piece_pattern(64)).into();
        let descriptor = fixture.descriptor()?;
        assert!(descriptor.piece_hashes().iter().all(|hash| *hash == expected));
        Ok(())
    }

    #[test]
    fn descriptor_carries_the_three_broken_trackers() -> HarnessResult<()> {
        let descriptor = create_descriptor(None, 32, 2)?;
        assert_eq!(
            descriptor.trackers(),
            [
                ANNOUNCE_UNRESOLVABLE,
                ANNOUNCE_MALFORMED,
                ANNOUNCE_UNSUPPORTED_SCHEME
            ]
        );
        assert_eq!(descriptor.name(), PAYLOAD_FILE_NAME);
        Ok(())
    }

    #[test]
    fn sink_receives_the_full_payload() -> HarnessResult<()> {
        let mut sink = Vec::new();
        create_descriptor(Some(&mut sink), 40, 3)?;
        assert_eq!(sink.len(), 120);
        assert!(sink.chunks(40).all(|chunk| chunk == piece_pattern(40).as_slice()));
        Ok(())
    }

    #[test]
    fn descriptors_are_reproducible() -> HarnessResult<()> {
        let first = create_descriptor(None, 128, 4)?;
        let second = create_descriptor(None, 128, 4)?;
        assert_eq!(first.info_hash(), second.info_hash());
        assert_eq!(first.as_bytes(), second.as_bytes());
        Ok(())
    }

    #[test]
    fn materialize_writes_payload_under_root() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let root = temp.path().join("tmp1_fixture");
        let fixture = ContentFixture::new(26, 4);
        let descriptor = fixture.materialize(&root)?;
        let written = fs::read(payload_path(&root))?;
        assert_eq!(written.len() as u64, descriptor.total_length());
        assert_eq!(&written[..26], b"ABCDEFGHIJKLMNOPQRSTUVWXYZ");
        Ok(())
    }
}
