//! The persistent build log, which records the command hash and output mtime
//! of every successful build so that later runs can detect changed command
//! lines, not just changed mtimes.
//!
//! The format is a versioned, line-oriented, append-only journal:
//!
//! ```text
//! # ninja log v6
//! <start-ms>TAB<end-ms>TAB<restat-mtime>TAB<output path>TAB<command hash hex>
//! ```
//!
//! The timestamps are informational; only restat-mtime and the hash affect
//! correctness.  On load, later entries win for the same output path.

use crate::fs::{FileSystem, MTime};
use crate::graph::{FileId, Graph};
use crate::hash::Hash;
use anyhow::anyhow;
use std::collections::HashMap;
use std::io::Write;

const VERSION: usize = 6;

/// A single surviving log record for one output path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub start_ms: u64,
    pub end_ms: u64,
    /// Output mtime observed after the command ran.  For restat edges this
    /// value, not the on-disk mtime, decides cleanliness.
    pub restat_mtime: MTime,
    pub command_hash: Hash,
}

/// The log as loaded at startup: one entry per output, plus enough
/// bookkeeping to decide whether the on-disk file should be compacted.
#[derive(Default)]
pub struct Log {
    entries: HashMap<FileId, Entry>,
    /// Entry lines present on disk, including superseded ones.
    disk_entries: usize,
    /// Set when the on-disk file had a missing or unknown version banner,
    /// forcing a rewrite.
    rewrite: bool,
}

impl Log {
    pub fn lookup(&self, id: FileId) -> Option<&Entry> {
        self.entries.get(&id)
    }

    /// An append-only log accumulates one line per task run; once the dead
    /// weight reaches half the file, rewrite it.
    fn needs_compaction(&self) -> bool {
        self.rewrite || self.disk_entries >= 2 * self.entries.len().max(1)
    }
}

fn parse_entry(line: &str) -> Option<(u64, u64, u64, &str, Hash)> {
    let mut fields = line.split('\t');
    let start_ms = fields.next()?.parse().ok()?;
    let end_ms = fields.next()?.parse().ok()?;
    let restat_mtime = fields.next()?.parse().ok()?;
    let name = fields.next()?;
    let hash = fields.next()?.parse().ok()?;
    if name.is_empty() || fields.next().is_some() {
        return None;
    }
    Some((start_ms, end_ms, restat_mtime, name, hash))
}

fn mtime_from_stamp(stamp: u64) -> MTime {
    // The log uses 0 as the "missing" sentinel.
    if stamp == 0 {
        MTime::Missing
    } else {
        MTime::Stamp(stamp)
    }
}

fn mtime_to_stamp(mtime: MTime) -> u64 {
    match mtime {
        MTime::Missing => 0,
        MTime::Stamp(stamp) => stamp,
    }
}

/// Load the build log at `path`, interning its output paths into the graph.
/// A missing file is an empty log; an unknown version is warned about and
/// ignored; a malformed trailing entry (truncated write) is dropped.
pub fn load(fs: &dyn FileSystem, graph: &mut Graph, path: &str) -> anyhow::Result<Log> {
    let bytes = match fs.read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Log::default()),
        Err(err) => return Err(anyhow!("read {}: {}", path, err)),
    };
    if bytes.is_empty() {
        // A created-but-never-written log, e.g. from a crash at startup.
        return Ok(Log {
            rewrite: true,
            ..Log::default()
        });
    }
    let text = String::from_utf8_lossy(&bytes);

    let mut lines = text.split('\n');
    let version = lines
        .next()
        .and_then(|banner| banner.strip_prefix("# ninja log v"))
        .and_then(|v| v.trim_end_matches('\r').parse::<usize>().ok());
    match version {
        Some(VERSION) => {}
        _ => {
            println!("nb: warning: unrecognized build log {}; starting over", path);
            return Ok(Log {
                rewrite: true,
                ..Log::default()
            });
        }
    }

    let mut log = Log::default();
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (start_ms, end_ms, restat_mtime, name, command_hash) = match parse_entry(line) {
            Some(parsed) => parsed,
            // A torn final write leaves a partial line; drop it and
            // everything after.
            None => break,
        };
        log.disk_entries += 1;
        let id = graph.file_id(name);
        log.entries.insert(
            id,
            Entry {
                start_ms,
                end_ms,
                restat_mtime: mtime_from_stamp(restat_mtime),
                command_hash,
            },
        );
    }
    Ok(log)
}

/// An open build log, ready to append records.
pub struct Writer {
    w: Box<dyn Write>,
}

impl Writer {
    pub fn new(w: Box<dyn Write>) -> Self {
        Writer { w }
    }

    /// Append one record and flush, so a crash leaves a consistent prefix.
    pub fn record(&mut self, name: &str, entry: &Entry) -> anyhow::Result<()> {
        writeln!(
            self.w,
            "{}\t{}\t{}\t{}\t{}",
            entry.start_ms,
            entry.end_ms,
            mtime_to_stamp(entry.restat_mtime),
            name,
            entry.command_hash
        )?;
        self.w.flush()?;
        Ok(())
    }
}

/// Open the on-disk log for appending.  When the loaded log says the file
/// carries too many superseded entries (or a bad banner), rewrite it from
/// the live map first.
pub fn open_for_write(graph: &Graph, log: &Log, path: &str) -> anyhow::Result<Writer> {
    let fresh = !std::path::Path::new(path).exists();
    let mut file = if fresh || log.needs_compaction() {
        let mut file = std::fs::File::create(path)
            .map_err(|err| anyhow!("create {}: {}", path, err))?;
        writeln!(file, "# ninja log v{}", VERSION)?;
        for (&id, entry) in log.entries.iter() {
            writeln!(
                file,
                "{}\t{}\t{}\t{}\t{}",
                entry.start_ms,
                entry.end_ms,
                mtime_to_stamp(entry.restat_mtime),
                graph.file(id).name,
                entry.command_hash
            )?;
        }
        file
    } else {
        std::fs::OpenOptions::new()
            .append(true)
            .open(path)
            .map_err(|err| anyhow!("open {}: {}", path, err))?
    };
    file.flush()?;
    Ok(Writer::new(Box::new(file)))
}
