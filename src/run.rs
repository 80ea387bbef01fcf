//! The command-line front end: options, manifest loading including the
//! self-rebuild fixed point, and result reporting.

use crate::fs::RealFileSystem;
use crate::progress::{DumbConsoleProgress, FancyConsoleProgress, Progress};
use crate::trace::Trace;
use crate::{db, load, signal, terminal, trace, work};
use anyhow::anyhow;
use std::path::Path;

struct BuildParams<'a> {
    options: work::Options,
    target_names: &'a [String],
    build_filename: &'a str,
}

/// Open the build log next to the manifest, honoring `builddir`.
fn open_log(
    fs: &RealFileSystem,
    state: &mut load::State,
) -> anyhow::Result<(db::Log, db::Writer)> {
    let path = match &state.builddir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .map_err(|err| anyhow!("create build directory {}: {}", dir, err))?;
            format!("{}/.ninja_log", dir)
        }
        None => ".ninja_log".to_string(),
    };
    let log = db::load(fs, &mut state.graph, &path)?;
    let writer = db::open_for_write(&state.graph, &log, &path)?;
    Ok((log, writer))
}

fn build(
    progress: &mut dyn Progress,
    trace: &mut Option<Trace>,
    params: &BuildParams,
) -> anyhow::Result<Option<usize>> {
    let fs = RealFileSystem::new();

    let mut state = trace::scope(trace, "load", || load::read(&fs, params.build_filename))?;
    let (mut log, mut writer) = open_log(&fs, &mut state)?;
    let mut roots = state.graph.root_nodes();
    let mut work = work::Work::new(
        &fs,
        &mut state.graph,
        &log,
        &mut writer,
        progress,
        &params.options,
    );

    // If the manifest itself has a build rule, bring it up to date first,
    // and reload everything if that did anything.  At most one reload, so
    // an always-dirty rebuild rule can't loop us forever.
    let mut prior_tasks = 0;
    if let Some(target) = work.is_build_target(params.build_filename) {
        work.want_fileid(target)?;
        match trace::scope(trace, "work.run", || work.run())? {
            None => return Ok(None),
            Some(0) => {
                // The manifest was already up to date.
            }
            Some(n) => {
                prior_tasks = n;
                state = trace::scope(trace, "load", || load::read(&fs, params.build_filename))?;
                let reopened = open_log(&fs, &mut state)?;
                log = reopened.0;
                writer = reopened.1;
                roots = state.graph.root_nodes();
                work = work::Work::new(
                    &fs,
                    &mut state.graph,
                    &log,
                    &mut writer,
                    progress,
                    &params.options,
                );
            }
        }
    }

    if !params.target_names.is_empty() {
        for name in params.target_names {
            work.want_file(name)?;
        }
    } else if !state.default.is_empty() {
        for &target in &state.default {
            work.want_fileid(target)?;
        }
    } else {
        // No targets and no defaults: build every root of the graph.
        for &target in &roots {
            work.want_fileid(target)?;
        }
    }

    let result = trace::scope(trace, "work.run", || work.run())?;
    Ok(result.map(|tasks| tasks + prior_tasks))
}

fn default_parallelism() -> anyhow::Result<usize> {
    Ok(usize::from(std::thread::available_parallelism()?))
}

#[derive(argh::FromArgs)] // this struct generates the flags and --help output
/// nb, a ninja-compatible build system
struct Opts {
    /// chdir before running
    #[argh(option, short = 'C')]
    chdir: Option<String>,

    /// input build file [default=build.ninja]
    #[argh(option, short = 'f', default = "(\"build.ninja\".into())")]
    build_file: String,

    /// debugging tools
    #[argh(option, short = 'd')]
    debug: Option<String>,

    /// subcommands
    #[argh(option, short = 't')]
    tool: Option<String>,

    /// parallelism [default uses system thread count]
    #[argh(option, short = 'j')]
    parallelism: Option<usize>,

    /// keep going until N failures (0 means infinity) [default=1]
    #[argh(option, short = 'k', default = "1")]
    keep_going: usize,

    /// dry run: pretend commands succeed without running anything
    #[argh(switch, short = 'n')]
    dry_run: bool,

    /// print executed command lines
    #[argh(switch, short = 'v')]
    verbose: bool,

    /// targets to build
    #[argh(positional)]
    targets: Vec<String>,
}

pub fn run() -> anyhow::Result<i32> {
    let opts: Opts = argh::from_env();

    let mut trace: Option<Trace> = None;
    if let Some(debug) = &opts.debug {
        match debug.as_str() {
            "list" => {
                println!("debugging modes:");
                println!("  trace  generate json performance trace");
                return Ok(1);
            }
            "trace" => trace = Some(Trace::open("trace.json")?),
            _ => anyhow::bail!("unknown -d {:?}, use -d list to list", debug),
        }
    }

    if let Some(tool) = &opts.tool {
        match tool.as_str() {
            "list" => {
                println!("subcommands:");
                println!("  (none yet)");
                return Ok(1);
            }
            _ => anyhow::bail!("unknown -t {:?}, use -t list to list", tool),
        }
    }

    if let Some(dir) = &opts.chdir {
        let dir = Path::new(dir);
        std::env::set_current_dir(dir).map_err(|err| anyhow!("chdir {:?}: {}", dir, err))?;
    }

    signal::register_sigint();

    let params = BuildParams {
        options: work::Options {
            parallelism: match opts.parallelism {
                Some(parallelism) => parallelism,
                None => default_parallelism()?,
            },
            keep_going: opts.keep_going,
            dry_run: opts.dry_run,
        },
        target_names: &opts.targets,
        build_filename: &opts.build_file,
    };

    let mut progress: Box<dyn Progress> = if terminal::use_fancy() {
        Box::new(FancyConsoleProgress::new(opts.verbose))
    } else {
        Box::new(DumbConsoleProgress::new(opts.verbose))
    };
    let result = build(progress.as_mut(), &mut trace, &params);
    // Restore the console before printing any summary.
    drop(progress);

    if let Some(trace) = &mut trace {
        trace.close()?;
    }

    match result? {
        None => {
            // The failing or interrupted task is the interesting output;
            // no summary beyond it.
            if signal::was_interrupted() {
                println!("nb: interrupted");
                Ok(130)
            } else {
                Ok(1)
            }
        }
        Some(0) => {
            println!("nb: no work to do");
            Ok(0)
        }
        Some(n) => {
            println!("nb: ran {} task{}, now up to date", n, if n == 1 { "" } else { "s" });
            Ok(0)
        }
    }
}
