//! Runs build tasks, potentially in parallel.
//! Unaware of the build graph, plans, etc.; just command execution.
//!
//! Parallelism is purely out-of-process: each running command gets a thread
//! that blocks on the child and reports the result over a channel, which
//! gives the scheduler a wait-any primitive.

use crate::depfile;
use crate::graph::{BuildId, RspFile};
use crate::process::{self, Termination};
use crate::scanner::Scanner;
use anyhow::{anyhow, bail};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Instant;

pub struct FinishedTask {
    /// A (faked) "thread id": a small integer naming the parallelism slot
    /// this task occupied.
    pub tid: usize,
    pub buildid: BuildId,
    pub span: (Instant, Instant),
    pub result: TaskResult,
}

/// The result of executing a build step.
pub struct TaskResult {
    pub termination: Termination,
    /// Console output, stdout and stderr interleaved.
    pub output: Vec<u8>,
    pub discovered_deps: Option<Vec<String>>,
}

/// Reads dependencies from a .d file path.
fn read_depfile(path: &Path) -> anyhow::Result<Vec<String>> {
    let mut bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => bail!("read {}: {}", path.display(), err),
    };
    bytes.push(0);
    let mut scanner = Scanner::new(&bytes);
    let parsed = depfile::parse(&mut scanner)
        .map_err(|err| anyhow!(scanner.format_parse_error(path, err)))?;
    Ok(parsed.deps.iter().map(|dep| dep.to_string()).collect())
}

fn write_rspfile(rspfile: &RspFile) -> anyhow::Result<()> {
    if let Some(parent) = rspfile.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&rspfile.path, &rspfile.content)?;
    Ok(())
}

/// Executes a build task as a subprocess.
/// Returns an Err() only on failures outside of the process itself.
fn run_task(
    cmdline: &str,
    depfile: Option<&Path>,
    rspfile: Option<&RspFile>,
) -> anyhow::Result<TaskResult> {
    if let Some(rspfile) = rspfile {
        write_rspfile(rspfile)?;
    }

    let (termination, output) = process::run_command(cmdline)?;

    if let Some(rspfile) = rspfile {
        // The spawn came back, so the response file has served its purpose,
        // whatever the exit code was.
        let _ = std::fs::remove_file(&rspfile.path);
    }

    let mut result = TaskResult {
        termination,
        output,
        discovered_deps: None,
    };
    if result.termination == Termination::Success {
        if let Some(depfile) = depfile {
            result.discovered_deps = Some(read_depfile(depfile)?);
        }
    }
    Ok(result)
}

/// Tracks the "thread ids" handed out to build tasks: small integers naming
/// parallelism slots.
#[derive(Default)]
struct ThreadIds {
    /// An entry is true when claimed, false or nonexistent otherwise.
    slots: Vec<bool>,
}

impl ThreadIds {
    fn claim(&mut self) -> usize {
        match self.slots.iter().position(|&used| !used) {
            Some(idx) => {
                self.slots[idx] = true;
                idx
            }
            None => {
                let idx = self.slots.len();
                self.slots.push(true);
                idx
            }
        }
    }

    fn release(&mut self, slot: usize) {
        self.slots[slot] = false;
    }
}

/// A bounded pool of running subprocesses.
pub struct Runner {
    finished_send: mpsc::Sender<FinishedTask>,
    finished_recv: mpsc::Receiver<FinishedTask>,
    pub running: usize,
    tids: ThreadIds,
    parallelism: usize,
    /// When set, commands are not spawned; completions are simulated as
    /// immediate successes with no output.
    dry_run: bool,
}

impl Runner {
    pub fn new(parallelism: usize, dry_run: bool) -> Self {
        let (tx, rx) = mpsc::channel();
        Runner {
            finished_send: tx,
            finished_recv: rx,
            running: 0,
            tids: ThreadIds::default(),
            parallelism,
            dry_run,
        }
    }

    pub fn can_start_more(&self) -> bool {
        self.running < self.parallelism
    }

    pub fn is_running(&self) -> bool {
        self.running > 0
    }

    pub fn start(
        &mut self,
        id: BuildId,
        cmdline: String,
        depfile: Option<PathBuf>,
        rspfile: Option<RspFile>,
    ) {
        let tid = self.tids.claim();
        let tx = self.finished_send.clone();

        if self.dry_run {
            let now = Instant::now();
            let _ = tx.send(FinishedTask {
                tid,
                buildid: id,
                span: (now, now),
                result: TaskResult {
                    termination: Termination::Success,
                    output: Vec::new(),
                    discovered_deps: None,
                },
            });
            self.running += 1;
            return;
        }

        std::thread::spawn(move || {
            let start = Instant::now();
            let result =
                run_task(&cmdline, depfile.as_deref(), rspfile.as_ref()).unwrap_or_else(|err| {
                    TaskResult {
                        termination: Termination::Failure,
                        output: err.to_string().into_bytes(),
                        discovered_deps: None,
                    }
                });
            let finish = Instant::now();

            let task = FinishedTask {
                tid,
                buildid: id,
                span: (start, finish),
                result,
            };
            // The send only fails if the receiver is gone, e.g. during
            // shutdown.
            let _ = tx.send(task);
        });
        self.running += 1;
    }

    /// Wait for a task to complete.  May block for a long time.
    pub fn wait(&mut self) -> FinishedTask {
        let task = self.finished_recv.recv().unwrap();
        self.tids.release(task.tid);
        self.running -= 1;
        task
    }
}
