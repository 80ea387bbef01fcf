//! Build progress tracking and reporting, for the purpose of display to
//! the user.

use crate::graph::{Build, BuildId};
use crate::process::Termination;
use crate::task::TaskResult;
use crate::terminal;
use crate::work::{BuildState, StateCounts};
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Compute the message to display on the console for a given build.
pub fn build_message(build: &Build) -> &str {
    build
        .desc
        .as_ref()
        .filter(|desc| !desc.is_empty())
        .unwrap_or_else(|| build.cmdline.as_ref().unwrap())
}

/// Trait for build progress notifications.
pub trait Progress {
    /// Called as builds move through their states.
    fn update(&mut self, counts: &StateCounts);

    /// Called when a task starts.
    fn task_started(&mut self, id: BuildId, build: &Build);

    /// Called when a task completes.
    fn task_finished(&mut self, id: BuildId, build: &Build, result: &TaskResult);

    /// Log a line of output without corrupting the progress display.
    /// The line persists beyond further progress updates, e.g. the output
    /// of a failed task stays visible while the build continues.
    fn log(&mut self, msg: &str);
}

/// Progress implementation for "dumb" console, without any overprinting.
#[derive(Default)]
pub struct DumbConsoleProgress {
    /// Whether to print command lines of started programs.
    verbose: bool,

    /// The id of the last command printed, used to avoid printing it twice
    /// when we have two updates from the same command in a row.
    last_started: Option<BuildId>,
}

impl DumbConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        Self {
            verbose,
            last_started: None,
        }
    }
}

impl Progress for DumbConsoleProgress {
    fn update(&mut self, _counts: &StateCounts) {
        // ignore
    }

    fn task_started(&mut self, id: BuildId, build: &Build) {
        self.log(if self.verbose {
            build.cmdline.as_ref().unwrap()
        } else {
            build_message(build)
        });
        self.last_started = Some(id);
    }

    fn task_finished(&mut self, id: BuildId, build: &Build, result: &TaskResult) {
        match result.termination {
            Termination::Success => {
                if result.output.is_empty() || self.last_started == Some(id) {
                    // Output is empty, or we just printed the command;
                    // don't print it again.
                } else {
                    self.log(build_message(build))
                }
            }
            Termination::Interrupted => self.log(&format!("interrupted: {}", build_message(build))),
            Termination::Failure => self.log(&format!("failed: {}", build_message(build))),
        };
        if !result.output.is_empty() {
            std::io::stdout().write_all(&result.output).unwrap();
        }
    }

    fn log(&mut self, msg: &str) {
        println!("{}", msg);
    }
}

/// Progress implementation for a "fancy" console, with a progress bar.
/// Each time it prints, it clears from the cursor to the end of the
/// console, prints the status text, and then moves the cursor back up to
/// the start position.  On errors etc. clearing the console again removes
/// any status.
pub struct FancyConsoleProgress {
    state: Arc<Mutex<FancyState>>,
}

/// Screen updates happen after this duration passes, to reduce the amount
/// of printing in the case of rapid updates and terminal flicker.
const UPDATE_DELAY: Duration = Duration::from_millis(50);

impl FancyConsoleProgress {
    pub fn new(verbose: bool) -> Self {
        let dirty_cond = Arc::new(Condvar::new());
        let state = Arc::new(Mutex::new(FancyState {
            done: false,
            dirty: false,
            dirty_cond: dirty_cond.clone(),
            counts: StateCounts::default(),
            tasks: VecDeque::new(),
            verbose,
        }));

        // Thread to debounce status updates: waits a bit after any dirty
        // state, then prints.
        std::thread::spawn({
            let state = state.clone();
            move || loop {
                // Wait to be notified of a display update, or time out at
                // 500ms so long-running tasks get their duration refreshed.
                {
                    let (state, _) = dirty_cond
                        .wait_timeout_while(
                            state.lock().unwrap(),
                            Duration::from_millis(500),
                            |state| !state.dirty,
                        )
                        .unwrap();
                    if state.done {
                        break;
                    }
                }

                // Delay a little in case more updates come in.
                std::thread::sleep(UPDATE_DELAY);

                state.lock().unwrap().print_progress();
            }
        });

        FancyConsoleProgress { state }
    }
}

impl Progress for FancyConsoleProgress {
    fn update(&mut self, counts: &StateCounts) {
        self.state.lock().unwrap().update(counts);
    }

    fn task_started(&mut self, id: BuildId, build: &Build) {
        self.state.lock().unwrap().task_started(id, build);
    }

    fn task_finished(&mut self, id: BuildId, build: &Build, result: &TaskResult) {
        self.state.lock().unwrap().task_finished(id, build, result);
    }

    fn log(&mut self, msg: &str) {
        self.state.lock().unwrap().log(msg);
    }
}

impl Drop for FancyConsoleProgress {
    fn drop(&mut self) {
        self.state.lock().unwrap().cleanup();
    }
}

/// Currently running build task, as tracked for progress updates.
struct Task {
    id: BuildId,
    /// When the task started running.
    start: Instant,
    /// Build status message for the task.
    message: String,
}

struct FancyState {
    done: bool,
    dirty: bool,
    dirty_cond: Arc<Condvar>,

    /// Counts of builds in each state.
    counts: StateCounts,
    /// Build tasks that are currently executing, oldest first.
    tasks: VecDeque<Task>,
    /// Whether to print command lines of started programs.
    verbose: bool,
}

impl FancyState {
    fn dirty(&mut self) {
        self.dirty = true;
        self.dirty_cond.notify_one();
    }

    fn update(&mut self, counts: &StateCounts) {
        self.counts = counts.clone();
        self.dirty();
    }

    fn task_started(&mut self, id: BuildId, build: &Build) {
        if self.verbose {
            self.log(build.cmdline.as_ref().unwrap());
        }
        self.tasks.push_back(Task {
            id,
            start: Instant::now(),
            message: build_message(build).to_string(),
        });
        self.dirty();
    }

    fn task_finished(&mut self, id: BuildId, build: &Build, result: &TaskResult) {
        self.tasks
            .remove(self.tasks.iter().position(|t| t.id == id).unwrap());
        match result.termination {
            Termination::Success => {
                if result.output.is_empty() {
                    // Common case: don't show anything.
                } else {
                    self.log(build_message(build))
                }
            }
            Termination::Interrupted => self.log(&format!("interrupted: {}", build_message(build))),
            Termination::Failure => self.log(&format!("failed: {}", build_message(build))),
        };
        if !result.output.is_empty() {
            self.clear_progress();
            std::io::stdout().write_all(&result.output).unwrap();
            self.dirty();
        }
    }

    fn log(&mut self, msg: &str) {
        self.clear_progress();
        println!("{}", msg);
        self.dirty();
    }

    fn cleanup(&mut self) {
        self.clear_progress();
        self.done = true;
        self.dirty(); // let the thread quit
    }

    fn clear_progress(&self) {
        // If the user hit ^C it may have printed something on the line, so
        // \r to go to the first column first, then clear downward.
        std::io::stdout().write_all(b"\r\x1b[J").unwrap();
    }

    fn print_progress(&mut self) {
        self.clear_progress();
        let failed = self.counts.get(BuildState::Failed);
        let mut progress_line = format!(
            "[{}] {}/{} done, ",
            progress_bar(&self.counts, 40),
            self.counts.get(BuildState::Done) + failed,
            self.counts.total()
        );
        if failed > 0 {
            progress_line.push_str(&format!("{} failed, ", failed));
        }
        progress_line.push_str(&format!(
            "{}/{} running",
            self.tasks.len(),
            self.counts.get(BuildState::Ready) + self.counts.get(BuildState::Running),
        ));
        println!("{}", progress_line);
        let mut lines = 1;

        let max_cols = terminal::get_cols().unwrap_or(80);
        let max_tasks = 8;
        let now = Instant::now();
        for task in self.tasks.iter().take(max_tasks) {
            let delta = now.duration_since(task.start).as_secs() as usize;
            println!("{}", task_message(&task.message, delta, max_cols));
            lines += 1;
        }

        if self.tasks.len() > max_tasks {
            println!("...and {} more", self.tasks.len() - max_tasks);
            lines += 1;
        }

        // Move the cursor up to the first printed line, for overprinting.
        print!("\x1b[{}A", lines);
        self.dirty = false;
    }
}

/// Format a task's status message to optionally include how long it has
/// been running, fitting within a maximum number of terminal columns.
fn task_message(message: &str, seconds: usize, max_cols: usize) -> String {
    let time_note = if seconds > 2 {
        format!(" ({}s)", seconds)
    } else {
        "".into()
    };
    let mut out = message.to_owned();
    if out.len() + time_note.len() >= max_cols {
        out.truncate(max_cols - time_note.len() - 3);
        out.push_str("...");
    }
    out.push_str(&time_note);
    out
}

/// Render a StateCounts as an ASCII progress bar.
fn progress_bar(counts: &StateCounts, bar_size: usize) -> String {
    let mut bar = String::with_capacity(bar_size);
    let mut sum: usize = 0;
    let total = counts.total();
    if total == 0 {
        return " ".repeat(bar_size);
    }
    for (count, ch) in [
        (
            counts.get(BuildState::Done) + counts.get(BuildState::Failed),
            '=',
        ),
        (
            counts.get(BuildState::Ready) + counts.get(BuildState::Running),
            '-',
        ),
        (counts.get(BuildState::Want), ' '),
    ] {
        sum += count;
        let mut target_size = sum * bar_size / total;
        if count > 0 && target_size == bar.len() && target_size < bar_size {
            // Ensure a non-zero count always gets at least one tick.
            target_size += 1;
        }
        while bar.len() < target_size {
            bar.push(ch);
        }
    }
    bar
}
