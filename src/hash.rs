//! Hashing of command lines for the build log.  A changed command must
//! rebuild its outputs even when every mtime is unchanged, so the log stores
//! a digest of the fully evaluated command text per output.

use std::hash::Hasher;

/// 64-bit digest of an edge's evaluated command line.
/// DefaultHasher is SipHash with fixed keys: stable across runs of the same
/// binary, which is the lifetime the on-disk log needs.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Hash(pub u64);

impl std::fmt::Display for Hash {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl std::str::FromStr for Hash {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Hash(u64::from_str_radix(s, 16)?))
    }
}

pub fn hash_command(cmdline: &str) -> Hash {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    hasher.write(cmdline.as_bytes());
    Hash(hasher.finish())
}
