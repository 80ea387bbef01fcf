//! Filesystem access as a capability, so the loader and the staleness
//! analyzer can run against an in-memory filesystem in tests.  Command
//! execution side effects (spawning, rspfiles, output directories) go
//! through std::fs directly; only reads and stats are abstracted.

use std::time::UNIX_EPOCH;

/// MTime info gathered for a file, in milliseconds since the epoch.
/// This also models "file is absent".
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MTime {
    Missing,
    Stamp(u64),
}

pub trait FileSystem {
    fn read(&self, path: &str) -> std::io::Result<Vec<u8>>;
    /// stat() an on-disk path, producing its MTime.
    fn stat(&self, path: &str) -> std::io::Result<MTime>;
}

pub struct RealFileSystem {}

impl RealFileSystem {
    pub fn new() -> Self {
        RealFileSystem {}
    }
}

impl Default for RealFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for RealFileSystem {
    fn read(&self, path: &str) -> std::io::Result<Vec<u8>> {
        std::fs::read(path)
    }

    fn stat(&self, path: &str) -> std::io::Result<MTime> {
        let meta = match std::fs::metadata(path) {
            Ok(meta) => meta,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MTime::Missing);
            }
            Err(err) => return Err(err),
        };
        let mtime = meta
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Ok(MTime::Stamp(mtime))
    }
}
