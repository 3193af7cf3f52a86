//! Entry hashes: the 64-bit identity every table and file name is keyed by.

use core::fmt;
use sha2::{Digest, Sha256};

/// Deterministic digest of a cache key. Distinct keys may collide; the
/// backend detects that by comparing keys and never hands out the wrong entry.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct EntryHash(pub u64);

impl EntryHash {
    /// Name of the file holding stream `index` of this entry.
    pub fn file_name(self, index: u32) -> String {
        format!("{:016x}_{}", self.0, index)
    }

    /// Inverse of `file_name` for stream 0; `None` for anything else.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let (hex, stream) = name.split_once('_')?;
        if hex.len() != 16 || stream != "0" {
            return None;
        }
        u64::from_str_radix(hex, 16).ok().map(EntryHash)
    }
}

impl fmt::Display for EntryHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Maps keys to entry hashes. Injected into the backend so the algorithm is
/// not baked into the coordinator.
pub trait EntryHasher {
    fn hash_key(&self, key: &str) -> EntryHash;
}

impl<F> EntryHasher for F
where
    F: Fn(&str) -> EntryHash,
{
    fn hash_key(&self, key: &str) -> EntryHash {
        self(key)
    }
}

/// Default hasher: the first eight bytes of SHA-256, little endian.
#[derive(Copy, Clone, Debug, Default)]
pub struct Sha256Hasher;

impl EntryHasher for Sha256Hasher {
    fn hash_key(&self, key: &str) -> EntryHash {
        let digest = Sha256::digest(key.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        EntryHash(u64::from_le_bytes(head))
    }
}
