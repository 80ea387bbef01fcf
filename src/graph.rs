//! The build graph: files, builds, and the references between them.
//!
//! Files and builds live in flat arenas owned by the Graph; cross-references
//! are typed indices into those arenas, which sidesteps the ownership cycles
//! a pointer-based graph would have.

use crate::densemap::{self, DenseMap};
use crate::fs::{FileSystem, MTime};
use anyhow::{anyhow, bail};
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;

/// Id for a File in the Graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u32);
impl densemap::Index for FileId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for FileId {
    fn from(u: usize) -> FileId {
        FileId(u as u32)
    }
}

/// Id for a Build in the Graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuildId(u32);
impl densemap::Index for BuildId {
    fn index(&self) -> usize {
        self.0 as usize
    }
}
impl From<usize> for BuildId {
    fn from(u: usize) -> BuildId {
        BuildId(u as u32)
    }
}

/// A file tracked by the graph, identified by its canonicalized path.
#[derive(Debug)]
pub struct File {
    pub name: String,
    /// The unique build that produces this file, if any.
    pub input: Option<BuildId>,
    /// Builds that consume this file as an input.
    pub dependents: Vec<BuildId>,
}

/// Source location of a build statement, for error messages.
#[derive(Debug, Clone)]
pub struct FileLoc {
    pub filename: Rc<PathBuf>,
    pub line: usize,
}
impl std::fmt::Display for FileLoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.filename.display(), self.line)
    }
}

/// A response file: written before the command is spawned, deleted after.
#[derive(Debug, Clone)]
pub struct RspFile {
    pub path: PathBuf,
    pub content: String,
}

/// Input edges to a build, in the order: explicit, implicit, order-only,
/// then any deps discovered from a depfile.  Only the counts are stored;
/// membership in a section is derived from position.
#[derive(Debug, Default)]
struct BuildIns {
    ids: Vec<FileId>,
    explicit: usize,
    implicit: usize,
    order_only: usize,
}

/// A single build step: producing some outputs from some inputs by running
/// a command.
#[derive(Debug)]
pub struct Build {
    /// Source location this build was declared at.
    pub location: FileLoc,

    /// Command to run, if any; phony builds have none.
    pub cmdline: Option<String>,
    /// Short description of the command, for progress display.
    pub desc: Option<String>,
    /// Path to the generated dependency file, if the rule declares one.
    pub depfile: Option<String>,
    /// Response file to materialize before running, if any.
    pub rspfile: Option<RspFile>,
    /// True if this build produces the manifest itself.
    pub generator: bool,
    /// True if outputs may be unchanged after running, triggering re-stat.
    pub restat: bool,

    ins: BuildIns,
    outs: Vec<FileId>,
    explicit_outs: usize,
}

impl Build {
    pub fn new(location: FileLoc) -> Self {
        Build {
            location,
            cmdline: None,
            desc: None,
            depfile: None,
            rspfile: None,
            generator: false,
            restat: false,
            ins: BuildIns::default(),
            outs: Vec::new(),
            explicit_outs: 0,
        }
    }

    pub fn set_ins(&mut self, ids: Vec<FileId>, explicit: usize, implicit: usize, order_only: usize) {
        debug_assert_eq!(ids.len(), explicit + implicit + order_only);
        self.ins = BuildIns {
            ids,
            explicit,
            implicit,
            order_only,
        };
    }

    pub fn set_outs(&mut self, ids: Vec<FileId>, explicit: usize) {
        self.outs = ids;
        self.explicit_outs = explicit;
    }

    /// All inputs: explicit, implicit, order-only, and discovered.
    pub fn ins(&self) -> &[FileId] {
        &self.ins.ids
    }

    /// Inputs whose $in expansion and mtimes affect the command.
    pub fn explicit_ins(&self) -> &[FileId] {
        &self.ins.ids[0..self.ins.explicit]
    }

    /// Inputs whose dirtiness or newer mtime dirties this build:
    /// explicit, implicit, and discovered, but not order-only.
    pub fn dirtying_ins(&self) -> impl Iterator<Item = FileId> + '_ {
        let declared = self.ins.explicit + self.ins.implicit;
        let order_only_end = declared + self.ins.order_only;
        self.ins.ids[0..declared]
            .iter()
            .chain(self.ins.ids[order_only_end..].iter())
            .copied()
    }

    /// The manifest-declared dirtying inputs: explicit and implicit only.
    pub fn declared_dirtying_ins(&self) -> &[FileId] {
        &self.ins.ids[0..self.ins.explicit + self.ins.implicit]
    }

    /// Inputs that are only required to exist and order this build, without
    /// their mtimes propagating.
    pub fn order_only_ins(&self) -> &[FileId] {
        let declared = self.ins.explicit + self.ins.implicit;
        &self.ins.ids[declared..declared + self.ins.order_only]
    }

    /// Inputs found via the depfile rather than declared in the manifest.
    pub fn discovered_ins(&self) -> &[FileId] {
        let declared = self.ins.explicit + self.ins.implicit + self.ins.order_only;
        &self.ins.ids[declared..]
    }

    /// Replace the discovered inputs with a fresh depfile parse, skipping
    /// paths already declared.  Returns true if anything changed.
    pub fn set_discovered_ins(&mut self, deps: Vec<FileId>) -> bool {
        let declared = self.ins.explicit + self.ins.implicit + self.ins.order_only;
        let deps: Vec<FileId> = deps
            .into_iter()
            .filter(|id| !self.ins.ids[0..declared].contains(id))
            .collect();
        if self.ins.ids[declared..] == deps[..] {
            return false;
        }
        self.ins.ids.truncate(declared);
        self.ins.ids.extend(deps);
        true
    }

    /// All outputs, explicit ones first.
    pub fn outs(&self) -> &[FileId] {
        &self.outs
    }

    pub fn explicit_outs(&self) -> &[FileId] {
        &self.outs[0..self.explicit_outs]
    }

    pub fn is_phony(&self) -> bool {
        self.cmdline.is_none()
    }
}

/// The complete build graph, plus the interning table mapping canonical
/// path to FileId.
#[derive(Debug, Default)]
pub struct Graph {
    pub files: DenseMap<FileId, File>,
    pub builds: DenseMap<BuildId, Build>,
    by_name: HashMap<String, FileId>,
}

impl Graph {
    pub fn new() -> Self {
        Graph::default()
    }

    /// Intern a canonicalized path, creating the File on first sight.
    pub fn file_id(&mut self, name: impl Into<String>) -> FileId {
        let name = name.into();
        match self.by_name.get(&name) {
            Some(&id) => id,
            None => {
                let id = self.files.push(File {
                    name: name.clone(),
                    input: None,
                    dependents: Vec::new(),
                });
                self.by_name.insert(name, id);
                id
            }
        }
    }

    pub fn lookup(&self, name: &str) -> Option<FileId> {
        self.by_name.get(name).copied()
    }

    pub fn file(&self, id: FileId) -> &File {
        self.files.get(id)
    }

    pub fn build(&self, id: BuildId) -> &Build {
        self.builds.get(id)
    }

    pub fn build_mut(&mut self, id: BuildId) -> &mut Build {
        self.builds.get_mut(id)
    }

    /// Add a fully-populated build to the graph, wiring up the output and
    /// dependent links.  A file can have at most one producing build.
    pub fn add_build(&mut self, mut build: Build) -> anyhow::Result<BuildId> {
        let id = self.builds.next_id();
        let mut outs: Vec<FileId> = Vec::with_capacity(build.outs.len());
        let mut explicit_outs = build.explicit_outs;
        for (i, &out) in build.outs.iter().enumerate() {
            if outs.contains(&out) {
                println!(
                    "nb: warning: {}: output {:?} is repeated in output list",
                    build.location,
                    self.file(out).name
                );
                if i < build.explicit_outs {
                    explicit_outs -= 1;
                }
                continue;
            }
            let file = self.files.get_mut(out);
            if file.input.is_some() {
                bail!(
                    "{}: multiple rules generate {:?}",
                    build.location,
                    file.name
                );
            }
            file.input = Some(id);
            outs.push(out);
        }
        build.outs = outs;
        build.explicit_outs = explicit_outs;

        for &input in &build.ins.ids {
            let dependents = &mut self.files.get_mut(input).dependents;
            if !dependents.contains(&id) {
                dependents.push(id);
            }
        }

        Ok(self.builds.push(build))
    }

    /// Note that `build` consumes `file`, e.g. when a depfile introduces a
    /// dependency the manifest didn't declare.
    pub fn add_dependent(&mut self, file: FileId, build: BuildId) {
        let dependents = &mut self.files.get_mut(file).dependents;
        if !dependents.contains(&build) {
            dependents.push(build);
        }
    }

    /// The roots of the graph: produced files nothing consumes.  Used as
    /// the build targets when the manifest declares no defaults.
    pub fn root_nodes(&self) -> Vec<FileId> {
        self.files
            .keys()
            .filter(|&id| {
                let file = self.files.get(id);
                file.input.is_some() && file.dependents.is_empty()
            })
            .collect()
    }

    /// Find the known path closest to `name` by edit distance, for
    /// "did you mean" suggestions.  Ties break lexicographically.
    pub fn spellcheck(&self, name: &str) -> Option<&str> {
        const MAX_DISTANCE: usize = 3;
        let mut best: Option<(usize, &str)> = None;
        for candidate in self.by_name.keys() {
            let candidate = candidate.as_str();
            if candidate == name {
                continue;
            }
            let distance = edit_distance(name, candidate, MAX_DISTANCE);
            if distance > MAX_DISTANCE {
                continue;
            }
            let better = match best {
                None => true,
                Some((best_distance, best_name)) => {
                    distance < best_distance
                        || (distance == best_distance && candidate < best_name)
                }
            };
            if better {
                best = Some((distance, candidate));
            }
        }
        best.map(|(_, name)| name)
    }
}

/// Levenshtein distance, capped: any result above `max` comes back as
/// max + 1.
fn edit_distance(a: &str, b: &str, max: usize) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max {
        return max + 1;
    }
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, &ca) in a.iter().enumerate() {
        let mut prev_diag = row[0];
        row[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            let val = (prev_diag + cost).min(row[j] + 1).min(row[j + 1] + 1);
            prev_diag = row[j + 1];
            row[j + 1] = val;
        }
    }
    row[b.len()]
}

/// The mtimes of graph files as observed this run.  None means the file has
/// not been stat()ed yet.
pub struct FileState(DenseMap<FileId, Option<MTime>>);

impl FileState {
    pub fn new(graph: &Graph) -> Self {
        FileState(DenseMap::new_sized(graph.files.next_id(), None))
    }

    pub fn get(&self, id: FileId) -> Option<MTime> {
        self.0.lookup(id).copied().flatten()
    }

    pub fn stat(&mut self, fs: &dyn FileSystem, id: FileId, name: &str) -> anyhow::Result<MTime> {
        let mtime = fs.stat(name).map_err(|err| anyhow!("stat {}: {}", name, err))?;
        self.0.set_grow(id, Some(mtime), None);
        Ok(mtime)
    }

    /// Override the recorded state, e.g. to propagate mtimes through a
    /// missing phony output.
    pub fn set(&mut self, id: FileId, mtime: MTime) {
        self.0.set_grow(id, Some(mtime), None);
    }
}
