//! Salted firmware fingerprints.
//!
//! A fingerprint is SHA-256 over a fresh random salt followed by the
//! firmware image. Docks asserted to run byte-identical firmware share
//! one salt; to keep one dock's valid digest from being replayed for a
//! sibling, each group member is only ever asked to prove a disjoint
//! sub-range of the digest, and the ranges together cover all of it.

use std::io::{Read, Seek, SeekFrom};

use opengantry_puppy_boot_protocol::FINGERPRINT_SIZE;
use sha2::{Digest, Sha256};

use crate::dock::{DOCK_COUNT, Dock};

/// A 32-byte salted digest of a firmware image.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct Fingerprint(pub [u8; FINGERPRINT_SIZE]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; FINGERPRINT_SIZE] {
        &self.0
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; FINGERPRINT_SIZE] {
        &mut self.0
    }

    /// Compare `size` bytes at `offset` against `other`.
    ///
    /// A range reaching past the digest is never a match and must not
    /// trigger any remote traffic in callers.
    pub fn matches_range(&self, other: &Fingerprint, offset: usize, size: usize) -> bool {
        if offset + size > FINGERPRINT_SIZE {
            return false;
        }
        self.0[offset..offset + size] == other.0[offset..offset + size]
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", hex::encode(self.0))
    }
}

/// The digest sub-range one member of a shared-salt group must prove.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DigestChunk {
    pub offset: u8,
    pub size: u8,
}

impl DigestChunk {
    /// The whole digest, used by singleton groups.
    pub const FULL: DigestChunk = DigestChunk {
        offset: 0,
        size: FINGERPRINT_SIZE as u8,
    };
}

/// Contiguous, near-even partition of the digest for a shared-salt group.
///
/// The first `32 % group_size` members take one extra byte, so the union
/// of all members' ranges tiles the digest exactly.
pub fn chunk_for_group_member(member: usize, group_size: usize) -> DigestChunk {
    debug_assert!(group_size >= 1);
    debug_assert!(member < group_size);
    if group_size <= 1 {
        return DigestChunk::FULL;
    }

    let base = FINGERPRINT_SIZE / group_size;
    let extra = FINGERPRINT_SIZE % group_size;
    let offset = member * base + member.min(extra);
    let size = base + usize::from(member < extra);

    DigestChunk {
        offset: offset as u8,
        size: size as u8,
    }
}

/// Per-dock salt and expected-fingerprint table for one bootstrap
/// attempt. Discarded when the attempt ends; nothing persists across
/// power cycles.
#[derive(Debug, Default, Clone)]
pub struct FingerprintTable {
    salts: [u32; DOCK_COUNT],
    digests: [Fingerprint; DOCK_COUNT],
}

impl FingerprintTable {
    pub fn salt(&self, dock: Dock) -> u32 {
        self.salts[dock.index() as usize]
    }

    pub fn set_salt(&mut self, dock: Dock, salt: u32) {
        self.salts[dock.index() as usize] = salt;
    }

    pub fn digest(&self, dock: Dock) -> &Fingerprint {
        &self.digests[dock.index() as usize]
    }

    pub fn set_digest(&mut self, dock: Dock, digest: Fingerprint) {
        self.digests[dock.index() as usize] = digest;
    }
}

/// Stream `length` bytes of `image` through SHA-256, salt first.
pub fn calculate_fingerprint<R: Read + Seek>(
    image: &mut R,
    length: u64,
    salt: u32,
) -> std::io::Result<Fingerprint> {
    image.seek(SeekFrom::Start(0))?;

    let mut sha = Sha256::new();
    sha.update(salt.to_le_bytes());

    let mut buffer = [0u8; 128];
    let mut remaining = length;
    while remaining > 0 {
        let want = (remaining as usize).min(buffer.len());
        let got = image.read(&mut buffer[..want])?;
        if got == 0 {
            break;
        }
        sha.update(&buffer[..got]);
        remaining -= got as u64;
    }

    let mut fingerprint = Fingerprint::default();
    fingerprint.0.copy_from_slice(&sha.finalize());
    Ok(fingerprint)
}
