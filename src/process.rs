//! Launching of build commands.  The engine never interprets a command
//! line; the whole string goes to the platform shell.

#[cfg(unix)]
pub use crate::process_posix::run_command;

/// How a command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Interrupted,
    Failure,
}

#[cfg(windows)]
pub fn run_command(cmdline: &str) -> anyhow::Result<(Termination, Vec<u8>)> {
    let out = std::process::Command::new("cmd")
        .arg("/c")
        .arg(cmdline)
        .output()?;
    let mut output = out.stdout;
    output.extend_from_slice(&out.stderr);
    let termination = if out.status.success() {
        Termination::Success
    } else {
        Termination::Failure
    };
    Ok((termination, output))
}

#[cfg(not(any(unix, windows)))]
pub fn run_command(_cmdline: &str) -> anyhow::Result<(Termination, Vec<u8>)> {
    anyhow::bail!("cannot spawn commands on this platform");
}
