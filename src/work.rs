//! The build scheduler: staleness analysis over the graph, the plan of
//! builds to run, and the main loop that drives tasks to completion.

use crate::canon::canon_path;
use crate::db;
use crate::densemap::DenseMap;
use crate::fs::{FileSystem, MTime};
use crate::graph::{BuildId, FileId, FileState, Graph};
use crate::hash::hash_command;
use crate::process::Termination;
use crate::progress::Progress;
use crate::signal;
use crate::task::{FinishedTask, Runner};
use anyhow::{anyhow, bail};
use std::collections::VecDeque;
use std::path::Path;
use std::time::Instant;

/// Build configuration, from the command line.
pub struct Options {
    pub parallelism: usize,
    /// Stop after this many task failures; 0 means never stop early.
    pub keep_going: usize,
    /// Don't spawn anything; report each command as an immediate success.
    pub dry_run: bool,
}

/// The lifecycle of a single build within one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildState {
    /// Not part of this run.
    Unknown,
    /// Wanted, but has unfinished producing builds.
    Want,
    /// All producing builds finished; queued to run.
    Ready,
    /// Currently executing.
    Running,
    /// Finished, or proven not to need running after all.
    Done,
    Failed,
}

/// Counts of builds in each state, for progress display.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateCounts([usize; 5]);

impl StateCounts {
    fn idx(state: BuildState) -> Option<usize> {
        match state {
            BuildState::Unknown => None,
            BuildState::Want => Some(0),
            BuildState::Ready => Some(1),
            BuildState::Running => Some(2),
            BuildState::Done => Some(3),
            BuildState::Failed => Some(4),
        }
    }

    pub fn add(&mut self, state: BuildState, delta: isize) {
        if let Some(idx) = Self::idx(state) {
            self.0[idx] = (self.0[idx] as isize + delta) as usize;
        }
    }

    pub fn get(&self, state: BuildState) -> usize {
        Self::idx(state).map_or(0, |idx| self.0[idx])
    }

    pub fn total(&self) -> usize {
        self.0.iter().sum()
    }
}

struct BuildStates {
    states: DenseMap<BuildId, BuildState>,
    counts: StateCounts,
}

impl BuildStates {
    fn new(graph: &Graph) -> Self {
        BuildStates {
            states: DenseMap::new_sized(graph.builds.next_id(), BuildState::Unknown),
            counts: StateCounts::default(),
        }
    }

    fn get(&self, id: BuildId) -> BuildState {
        *self.states.get(id)
    }

    fn set(&mut self, id: BuildId, state: BuildState) {
        self.counts.add(self.get(id), -1);
        self.counts.add(state, 1);
        *self.states.get_mut(id) = state;
    }
}

/// Per-build memo of the staleness analysis.
#[derive(Clone, Copy, PartialEq)]
enum Visit {
    None,
    /// On the analysis stack; seeing this again means a dependency cycle.
    InProgress,
    Computed(bool),
}

/// The subset of dirty builds selected to run, with readiness tracking.
struct Plan {
    /// For wanted builds, how many of their producing input builds haven't
    /// finished yet.
    unmet: DenseMap<BuildId, usize>,
    /// Wanted builds with no unmet dependencies, in the order they became
    /// ready.
    ready: VecDeque<BuildId>,
    /// Wanted builds not yet done or failed.
    pending: usize,
}

impl Plan {
    fn new(graph: &Graph) -> Self {
        Plan {
            unmet: DenseMap::new_sized(graph.builds.next_id(), 0),
            ready: VecDeque::new(),
            pending: 0,
        }
    }
}

/// Drives the build: owns the analysis state, the plan, and the runner, and
/// commits results to the build log as tasks finish.
pub struct Work<'a> {
    fs: &'a dyn FileSystem,
    graph: &'a mut Graph,
    last_log: &'a db::Log,
    db: &'a mut db::Writer,
    progress: &'a mut dyn Progress,
    options: &'a Options,

    file_state: FileState,
    dirty: DenseMap<BuildId, Visit>,
    states: BuildStates,
    plan: Plan,
    runner: Runner,
    start_time: Instant,
}

impl<'a> Work<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        graph: &'a mut Graph,
        last_log: &'a db::Log,
        db: &'a mut db::Writer,
        progress: &'a mut dyn Progress,
        options: &'a Options,
    ) -> Self {
        let file_state = FileState::new(graph);
        let dirty = DenseMap::new_sized(graph.builds.next_id(), Visit::None);
        let states = BuildStates::new(graph);
        let plan = Plan::new(graph);
        Work {
            fs,
            graph,
            last_log,
            db,
            progress,
            options,
            file_state,
            dirty,
            states,
            plan,
            runner: Runner::new(options.parallelism, options.dry_run),
            start_time: Instant::now(),
        }
    }

    /// Look up the target that produces `name`, if any build does.
    pub fn is_build_target(&self, name: &str) -> Option<FileId> {
        let name = canon_path(name).ok()?;
        let id = self.graph.lookup(&name)?;
        self.graph.file(id).input.map(|_| id)
    }

    /// Request that `name` be brought up to date, analyzing its subgraph.
    pub fn want_file(&mut self, name: impl Into<String>) -> anyhow::Result<()> {
        let name = canon_path(name)?;
        match self.graph.lookup(&name) {
            Some(id) => self.want_fileid(id),
            None => match self.graph.spellcheck(&name) {
                Some(suggestion) => {
                    bail!("unknown target {:?}, did you mean {:?}?", name, suggestion)
                }
                None => bail!("unknown target {:?}", name),
            },
        }
    }

    pub fn want_fileid(&mut self, id: FileId) -> anyhow::Result<()> {
        let mut stack = Vec::new();
        if self.check_input(id, &mut stack)? {
            let bid = self.graph.file(id).input.unwrap();
            self.want_build(bid)?;
        } else if self.graph.file(id).input.is_none()
            && self.ensure_stat(id)? == MTime::Missing
        {
            bail!(
                "{:?} missing and no known rule to make it",
                self.graph.file(id).name
            );
        }
        Ok(())
    }

    fn set_state(&mut self, id: BuildId, state: BuildState) {
        self.states.set(id, state);
        self.progress.update(&self.states.counts);
    }

    /// Stat a file unless this run already knows its mtime.
    fn ensure_stat(&mut self, id: FileId) -> anyhow::Result<MTime> {
        if let Some(mtime) = self.file_state.get(id) {
            return Ok(mtime);
        }
        self.file_state
            .stat(self.fs, id, &self.graph.file(id).name)
    }

    /// If a previous run left a depfile for this build, fold its deps into
    /// the graph before judging staleness.
    fn load_depfile_deps(&mut self, id: BuildId) -> anyhow::Result<()> {
        let path = match &self.graph.build(id).depfile {
            None => return Ok(()),
            Some(path) => path.clone(),
        };
        let mut bytes = match self.fs.read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => bail!("read {}: {}", path, err),
        };
        bytes.push(0);
        let mut scanner = crate::scanner::Scanner::new(&bytes);
        let parsed = crate::depfile::parse(&mut scanner)
            .map_err(|err| anyhow!(scanner.format_parse_error(Path::new(&path), err)))?;
        let mut deps = Vec::with_capacity(parsed.deps.len());
        for dep in parsed.deps {
            deps.push(self.graph.file_id(canon_path(dep.into_owned())?));
        }
        for &dep in &deps {
            self.graph.add_dependent(dep, id);
        }
        self.graph.build_mut(id).set_discovered_ins(deps);
        Ok(())
    }

    /// The dirtiness of the build producing `fid`, analyzing it on first
    /// visit; false for source files.  `stack` holds the files whose
    /// producers are being analyzed, for cycle reporting.
    fn check_input(&mut self, fid: FileId, stack: &mut Vec<FileId>) -> anyhow::Result<bool> {
        let bid = match self.graph.file(fid).input {
            None => return Ok(false),
            Some(bid) => bid,
        };
        match *self.dirty.get(bid) {
            Visit::Computed(dirty) => Ok(dirty),
            Visit::InProgress => {
                let pos = stack
                    .iter()
                    .position(|&f| self.graph.file(f).input == Some(bid))
                    .unwrap_or(0);
                let mut names: Vec<&str> = stack[pos..]
                    .iter()
                    .map(|&f| self.graph.file(f).name.as_str())
                    .collect();
                names.push(self.graph.file(fid).name.as_str());
                if stack[pos] != fid {
                    names.push(self.graph.file(stack[pos]).name.as_str());
                }
                bail!("dependency cycle: {}", names.join(" -> "));
            }
            Visit::None => {
                stack.push(fid);
                let dirty = self.check_dirty(bid, stack)?;
                stack.pop();
                Ok(dirty)
            }
        }
    }

    /// Decide whether a build must run, memoized per build.
    fn check_dirty(&mut self, id: BuildId, stack: &mut Vec<FileId>) -> anyhow::Result<bool> {
        if let Visit::Computed(dirty) = *self.dirty.get(id) {
            return Ok(dirty);
        }
        *self.dirty.get_mut(id) = Visit::InProgress;
        let dirty = self.check_dirty_uncached(id, stack)?;
        *self.dirty.get_mut(id) = Visit::Computed(dirty);
        Ok(dirty)
    }

    fn check_dirty_uncached(&mut self, id: BuildId, stack: &mut Vec<FileId>) -> anyhow::Result<bool> {
        self.load_depfile_deps(id)?;

        let build = self.graph.build(id);
        let declared: Vec<FileId> = build.declared_dirtying_ins().to_vec();
        let discovered: Vec<FileId> = build.discovered_ins().to_vec();
        let order_only: Vec<FileId> = build.order_only_ins().to_vec();
        let outs: Vec<FileId> = build.outs().to_vec();
        let is_phony = build.is_phony();
        let location = build.location.clone();

        let mut dirty = false;
        let mut newest_input: Option<u64> = None;

        for &fid in &declared {
            if self.check_input(fid, stack)? {
                dirty = true;
            }
            match self.ensure_stat(fid)? {
                MTime::Stamp(mtime) => {
                    newest_input = Some(newest_input.map_or(mtime, |n| n.max(mtime)));
                }
                MTime::Missing => {
                    if self.graph.file(fid).input.is_none() {
                        bail!(
                            "{}: {:?} missing and no known rule to make it",
                            location,
                            self.graph.file(fid).name
                        );
                    }
                    // Either its producer is dirty (already propagated
                    // above), or a clean phony declares it optional; it
                    // contributes no mtime either way.
                }
            }
        }

        for &fid in &discovered {
            // Depfile-discovered deps dirty like declared ones, except a
            // missing one (e.g. a deleted header) just forces a rebuild.
            if self.check_input(fid, stack)? {
                dirty = true;
            }
            match self.ensure_stat(fid)? {
                MTime::Stamp(mtime) => {
                    newest_input = Some(newest_input.map_or(mtime, |n| n.max(mtime)));
                }
                MTime::Missing => dirty = true,
            }
        }

        for &fid in &order_only {
            // Order-only inputs must exist, but neither their dirtiness nor
            // their mtimes propagate.
            let _ = self.check_input(fid, stack)?;
            if self.ensure_stat(fid)? == MTime::Missing {
                if self.graph.file(fid).input.is_none() {
                    bail!(
                        "{}: {:?} missing and no known rule to make it",
                        location,
                        self.graph.file(fid).name
                    );
                }
                dirty = true;
            }
        }

        if is_phony {
            // A phony build never runs; it is dirty when its inputs are,
            // and a missing output passes the newest input mtime through to
            // consumers.
            for &out in &outs {
                if self.ensure_stat(out)? == MTime::Missing {
                    if let Some(newest) = newest_input {
                        self.file_state.set(out, MTime::Stamp(newest));
                    }
                }
            }
            return Ok(dirty);
        }

        if self.outputs_dirty(id, newest_input)? {
            dirty = true;
        }
        Ok(dirty)
    }

    /// The output-side staleness rules: every output must exist, be no
    /// older than the newest dirtying input, and carry a matching command
    /// hash in the build log.
    fn outputs_dirty(&mut self, id: BuildId, newest_input: Option<u64>) -> anyhow::Result<bool> {
        let build = self.graph.build(id);
        let outs: Vec<FileId> = build.outs().to_vec();
        let restat = build.restat;
        let generator = build.generator;
        let hash = hash_command(build.cmdline.as_deref().unwrap_or(""));

        for &out in &outs {
            let mtime = self.ensure_stat(out)?;
            let entry = self.last_log.lookup(out).copied();
            let disk = match mtime {
                MTime::Missing => return Ok(true),
                MTime::Stamp(disk) => disk,
            };
            // For restat builds the log's recorded mtime is authoritative;
            // the command may legitimately leave the file untouched.
            let effective = match entry {
                Some(entry) if restat => match entry.restat_mtime {
                    MTime::Stamp(logged) => logged,
                    MTime::Missing => disk,
                },
                _ => disk,
            };
            if let Some(newest) = newest_input {
                if effective < newest {
                    return Ok(true);
                }
            }
            match entry {
                // The output exists but we have no record of building it.
                None => return Ok(true),
                Some(entry) => {
                    if !generator && entry.command_hash != hash {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Pull a dirty build (and, transitively, its dirty producers) into the
    /// plan.
    fn want_build(&mut self, id: BuildId) -> anyhow::Result<()> {
        if self.states.get(id) != BuildState::Unknown {
            return Ok(());
        }
        self.set_state(id, BuildState::Want);
        self.plan.pending += 1;

        // The distinct dirty builds producing our inputs; order-only
        // producers count for scheduling even though they didn't count for
        // dirtiness.
        let ins: Vec<FileId> = self.graph.build(id).ins().to_vec();
        let mut producers: Vec<BuildId> = Vec::new();
        for fid in ins {
            if let Some(producer) = self.graph.file(fid).input {
                if *self.dirty.get(producer) == Visit::Computed(true)
                    && !producers.contains(&producer)
                {
                    producers.push(producer);
                }
            }
        }
        let mut unmet = 0;
        for &producer in &producers {
            self.want_build(producer)?;
            // A producer can already be done here, when the manifest
            // sub-build shared part of the graph with the user build.
            if self.states.get(producer) != BuildState::Done {
                unmet += 1;
            }
        }

        if unmet == 0 {
            self.set_state(id, BuildState::Ready);
            self.plan.ready.push_back(id);
        } else {
            self.plan.unmet.set_grow(id, unmet, 0);
        }
        Ok(())
    }

    /// Re-evaluate a wanted build after its producers finished without
    /// changing their outputs; true means it still has to run.  Inputs have
    /// all been built by the time this runs.
    fn recheck_dirty(&mut self, id: BuildId) -> anyhow::Result<bool> {
        if self.graph.build(id).is_phony() {
            return Ok(true);
        }
        let dirtying: Vec<FileId> = self.graph.build(id).dirtying_ins().collect();
        let mut newest_input: Option<u64> = None;
        for fid in dirtying {
            match self.ensure_stat(fid)? {
                MTime::Stamp(mtime) => {
                    newest_input = Some(newest_input.map_or(mtime, |n| n.max(mtime)));
                }
                MTime::Missing => return Ok(true),
            }
        }
        self.outputs_dirty(id, newest_input)
    }

    /// Mark a build done and wake any dependents it was blocking.  When
    /// `outputs_unchanged`, newly-ready dependents get re-checked and may be
    /// proven clean, cascading further.
    fn finish_build(&mut self, id: BuildId, outputs_unchanged: bool) -> anyhow::Result<()> {
        self.set_state(id, BuildState::Done);
        self.plan.pending -= 1;

        let outs: Vec<FileId> = self.graph.build(id).outs().to_vec();
        let mut dependents: Vec<BuildId> = Vec::new();
        for out in outs {
            for &dep in &self.graph.file(out).dependents {
                if self.states.get(dep) == BuildState::Want && !dependents.contains(&dep) {
                    dependents.push(dep);
                }
            }
        }
        for dep in dependents {
            let unmet = self.plan.unmet.get_mut(dep);
            *unmet -= 1;
            if *unmet > 0 {
                continue;
            }
            if outputs_unchanged && !self.recheck_dirty(dep)? {
                self.finish_build(dep, true)?;
                continue;
            }
            self.set_state(dep, BuildState::Ready);
            self.plan.ready.push_back(dep);
        }
        Ok(())
    }

    /// "Run" a phony build: no command, but mtimes flow through to
    /// consumers now that the inputs are up to date.
    fn finish_phony(&mut self, id: BuildId) -> anyhow::Result<()> {
        let dirtying: Vec<FileId> = self.graph.build(id).dirtying_ins().collect();
        let mut newest_input: Option<u64> = None;
        for fid in dirtying {
            if let MTime::Stamp(mtime) = self.ensure_stat(fid)? {
                newest_input = Some(newest_input.map_or(mtime, |n| n.max(mtime)));
            }
        }
        let outs: Vec<FileId> = self.graph.build(id).outs().to_vec();
        for out in outs {
            let disk = self
                .fs
                .stat(&self.graph.file(out).name)
                .map_err(|err| anyhow!("stat {}: {}", self.graph.file(out).name, err))?;
            match disk {
                MTime::Missing => {
                    if let Some(newest) = newest_input {
                        self.file_state.set(out, MTime::Stamp(newest));
                    }
                }
                stamp => self.file_state.set(out, stamp),
            }
        }
        self.finish_build(id, true)
    }

    /// Submit a ready build's command to the runner.
    fn start_task(&mut self, id: BuildId) -> anyhow::Result<()> {
        if !self.options.dry_run {
            // Commands assume their output directories exist.
            for &out in self.graph.build(id).outs() {
                if let Some(parent) = Path::new(&self.graph.file(out).name).parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)
                            .map_err(|err| anyhow!("mkdir {}: {}", parent.display(), err))?;
                    }
                }
            }
        }
        let build = self.graph.build(id);
        let cmdline = build.cmdline.clone().unwrap();
        let depfile = build.depfile.clone().map(std::path::PathBuf::from);
        let rspfile = build.rspfile.clone();
        self.progress.task_started(id, build);
        self.set_state(id, BuildState::Running);
        self.runner.start(id, cmdline, depfile, rspfile);
        Ok(())
    }

    /// After a successful command: fold in discovered deps, re-stat the
    /// outputs, and append them to the build log.  Returns true when this
    /// was a restat build whose outputs all came back unchanged.
    fn record_finished(&mut self, id: BuildId, task: &FinishedTask) -> anyhow::Result<bool> {
        if let Some(names) = &task.result.discovered_deps {
            let mut deps = Vec::with_capacity(names.len());
            for name in names {
                deps.push(self.graph.file_id(canon_path(name.clone())?));
            }
            for &dep in &deps {
                self.graph.add_dependent(dep, id);
            }
            self.graph.build_mut(id).set_discovered_ins(deps);
        }

        if self.options.dry_run {
            return Ok(false);
        }

        let build = self.graph.build(id);
        let restat = build.restat;
        let hash = hash_command(build.cmdline.as_deref().unwrap_or(""));
        let outs: Vec<FileId> = build.outs().to_vec();
        let dirtying: Vec<FileId> = build.dirtying_ins().collect();

        // For restat builds that left an output untouched, the newest input
        // mtime is recorded instead, so the next run compares clean.
        let mut newest_input: Option<u64> = None;
        if restat {
            for fid in dirtying {
                if let MTime::Stamp(mtime) = self.ensure_stat(fid)? {
                    newest_input = Some(newest_input.map_or(mtime, |n| n.max(mtime)));
                }
            }
        }

        let start_ms = task.span.0.duration_since(self.start_time).as_millis() as u64;
        let end_ms = task.span.1.duration_since(self.start_time).as_millis() as u64;

        let mut unchanged = restat;
        for &out in &outs {
            let before = self.file_state.get(out);
            let after = self
                .file_state
                .stat(self.fs, out, &self.graph.file(out).name)?;
            let out_unchanged = restat && before == Some(after);
            if !out_unchanged {
                unchanged = false;
            }
            let recorded = match (out_unchanged, after, newest_input) {
                (true, MTime::Stamp(disk), Some(newest)) => MTime::Stamp(disk.max(newest)),
                _ => after,
            };
            self.db.record(
                &self.graph.file(out).name,
                &db::Entry {
                    start_ms,
                    end_ms,
                    restat_mtime: recorded,
                    command_hash: hash,
                },
            )?;
        }
        Ok(unchanged)
    }

    fn handle_finished(
        &mut self,
        task: FinishedTask,
        tasks_ran: &mut usize,
        failures: &mut usize,
        interrupted: &mut bool,
    ) -> anyhow::Result<()> {
        let id = task.buildid;
        self.progress
            .task_finished(id, self.graph.build(id), &task.result);
        match task.result.termination {
            Termination::Success => {
                *tasks_ran += 1;
                let outputs_unchanged = self.record_finished(id, &task)?;
                self.finish_build(id, outputs_unchanged)?;
            }
            Termination::Interrupted => {
                *interrupted = true;
                self.set_state(id, BuildState::Failed);
                self.plan.pending -= 1;
            }
            Termination::Failure => {
                *failures += 1;
                self.set_state(id, BuildState::Failed);
                self.plan.pending -= 1;
            }
        }
        Ok(())
    }

    /// Run the plan to completion.  Returns the number of tasks that ran,
    /// or None if the build failed or was interrupted (the failing tasks
    /// have already been reported through the progress sink).
    pub fn run(&mut self) -> anyhow::Result<Option<usize>> {
        let mut tasks_ran = 0;
        let mut failures = 0;
        let mut interrupted = false;

        while self.plan.pending > 0 {
            if interrupted || signal::was_interrupted() {
                interrupted = true;
                break;
            }

            let failures_allowed =
                self.options.keep_going == 0 || failures < self.options.keep_going;
            if failures_allowed && self.runner.can_start_more() {
                if let Some(id) = self.plan.ready.pop_front() {
                    if self.graph.build(id).is_phony() {
                        self.finish_phony(id)?;
                    } else {
                        self.start_task(id)?;
                    }
                    continue;
                }
            }

            if self.runner.is_running() {
                let task = self.runner.wait();
                self.handle_finished(task, &mut tasks_ran, &mut failures, &mut interrupted)?;
                continue;
            }

            // Nothing ready and nothing running: the remaining wanted
            // builds are blocked behind failures.
            break;
        }

        // Let in-flight children finish before reporting.
        while self.runner.is_running() {
            let task = self.runner.wait();
            self.handle_finished(task, &mut tasks_ran, &mut failures, &mut interrupted)?;
        }

        if failures > 0 || interrupted || signal::was_interrupted() {
            return Ok(None);
        }
        Ok(Some(tasks_ran))
    }
}
