//! Transfer descriptors: bencoded metainfo with a verifiable piece-hash list.
//!
//! # Design
//! - The bencoded bytes are the source of truth; parsed fields are derived
//!   from them once and never mutated.
//! - The info-hash is the SHA-1 of the canonical `info` dictionary encoding.

use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;
use sha1::{Digest, Sha1};

use crate::error::{HarnessError, HarnessResult};

/// Length of a SHA-1 digest.
pub const HASH_LEN: usize = 20;

/// SHA-1 of a descriptor's `info` dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InfoHash(pub [u8; HASH_LEN]);

impl Display for InfoHash {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&hex::encode(self.0))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct MetainfoFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    announce: Option<String>,
    #[serde(
        rename = "announce-list",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    announce_list: Vec<Vec<String>>,
    info: InfoDict,
}

#[derive(Debug, Serialize, Deserialize)]
struct InfoDict {
    length: u64,
    name: String,
    #[serde(rename = "piece length")]
    piece_length: u64,
    pieces: ByteBuf,
}

/// Read-only, shareable descriptor of a single-file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor {
    inner: Arc<DescriptorInner>,
}

#[derive(Debug, PartialEq, Eq)]
struct DescriptorInner {
    bytes: Vec<u8>,
    info_hash: InfoHash,
    name: String,
    piece_length: u64,
    total_length: u64,
    piece_hashes: Vec<[u8; HASH_LEN]>,
    trackers: Vec<String>,
}

impl Descriptor {
    pub(crate) fn encode(
        name: &str,
        piece_length: u64,
        total_length: u64,
        piece_hashes: &[[u8; HASH_LEN]],
        trackers: &[&str],
    ) -> HarnessResult<Self> {
        let file = MetainfoFile {
            announce: trackers.first().map(|url| (*url).to_string()),
            announce_list: if trackers.is_empty() {
                Vec::new()
            } else {
                vec![trackers.iter().map(|url| (*url).to_string()).collect()]
            },
            info: InfoDict {
                length: total_length,
                name: name.to_string(),
                piece_length,
                pieces: ByteBuf::from(piece_hashes.concat()),
            },
        };
        let bytes = serde_bencode::to_bytes(&file)
            .map_err(|source| HarnessError::DescriptorEncode { source })?;
        Self::from_bytes(&bytes)
    }

    /// Parse and validate a bencoded descriptor.
    ///
    /// # Errors
    ///
    /// Returns an error when the payload is not valid bencode, the hash list
    /// is not a whole number of digests, or the piece count does not cover the
    /// declared length.
    pub fn from_bytes(bytes: &[u8]) -> HarnessResult<Self> {
        let file: MetainfoFile = serde_bencode::from_bytes(bytes)
            .map_err(|source| HarnessError::DescriptorDecode { source })?;
        let info = &file.info;

        if info.piece_length == 0 {
            return Err(HarnessError::Descriptor {
                reason: "piece length must be positive",
            });
        }
        if info.pieces.len() % HASH_LEN != 0 {
            return Err(HarnessError::Descriptor {
                reason: "piece hash list is not a multiple of 20 bytes",
            });
        }
        let piece_hashes: Vec<[u8; HASH_LEN]> = info
            .pieces
            .chunks_exact(HASH_LEN)
            .map(|chunk| {
                let mut hash = [0_u8; HASH_LEN];
                hash.copy_from_slice(chunk);
                hash
            })
            .collect();
        let expected_pieces = info.length.div_ceil(info.piece_length);
        if piece_hashes.len() as u64 != expected_pieces {
            return Err(HarnessError::Descriptor {
                reason: "piece count does not cover total length",
            });
        }

        let info_bytes = serde_bencode::to_bytes(info)
            .map_err(|source| HarnessError::DescriptorEncode { source })?;
        let info_hash = InfoHash(Sha1::digest(&info_bytes).into());

        let mut trackers: Vec<String> = file.announce_list.into_iter().flatten().collect();
        if trackers.is_empty() {
            trackers.extend(file.announce);
        }

        Ok(Self {
            inner: Arc::new(DescriptorInner {
                bytes: bytes.to_vec(),
                info_hash,
                name: file.info.name,
                piece_length: file.info.piece_length,
                total_length: file.info.length,
                piece_hashes,
                trackers,
            }),
        })
    }

    /// Bencoded representation.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.inner.bytes
    }

    /// SHA-1 of the `info` dictionary.
    #[must_use]
    pub fn info_hash(&self) -> InfoHash {
        self.inner.info_hash
    }

    /// Payload file name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Bytes per piece.
    #[must_use]
    pub fn piece_length(&self) -> u64 {
        self.inner.piece_length
    }

    /// Total payload size in bytes.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.inner.total_length
    }

    /// Number of pieces.
    #[must_use]
    pub fn num_pieces(&self) -> usize {
        self.inner.piece_hashes.len()
    }

    /// Per-piece SHA-1 digests in piece order.
    #[must_use]
    pub fn piece_hashes(&self) -> &[[u8; HASH_LEN]] {
        &self.inner.piece_hashes
    }

    /// Announce URLs in tier order.
    #[must_use]
    pub fn trackers(&self) -> &[String] {
        &self.inner.trackers
    }
}
