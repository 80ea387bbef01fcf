//! Implements run_command on posix using posix_spawn.
//!
//! Rust's std::process can't feed stdout and stderr of a child into one
//! pipe, which we need so that interleaved task output reads sensibly, so
//! spawn the shell ourselves.

use crate::process::Termination;
use anyhow::bail;
use libc::c_char;
use std::io::{Read, Write};
use std::os::fd::FromRawFd;
use std::os::unix::process::ExitStatusExt;

/// Check a call that flags failure by returning -1 with errno set.
fn check_posix(func: &str, ret: libc::c_int) -> anyhow::Result<()> {
    if ret < 0 {
        bail!("{}: {}", func, std::io::Error::last_os_error());
    }
    Ok(())
}

/// Check a posix_spawn-family call, which returns the error code directly.
fn check_spawn(func: &str, err: libc::c_int) -> anyhow::Result<()> {
    if err != 0 {
        bail!("{}: {}", func, std::io::Error::from_raw_os_error(err));
    }
    Ok(())
}

/// Wraps libc::posix_spawn_file_actions_t, in particular to implement Drop.
struct PosixSpawnFileActions(libc::posix_spawn_file_actions_t);

impl PosixSpawnFileActions {
    fn new() -> anyhow::Result<Self> {
        unsafe {
            let mut actions: libc::posix_spawn_file_actions_t = std::mem::zeroed();
            check_spawn(
                "posix_spawn_file_actions_init",
                libc::posix_spawn_file_actions_init(&mut actions),
            )?;
            Ok(Self(actions))
        }
    }

    fn as_ptr(&mut self) -> *mut libc::posix_spawn_file_actions_t {
        &mut self.0
    }

    fn adddup2(&mut self, fd: i32, newfd: i32) -> anyhow::Result<()> {
        unsafe {
            check_spawn(
                "posix_spawn_file_actions_adddup2",
                libc::posix_spawn_file_actions_adddup2(&mut self.0, fd, newfd),
            )
        }
    }

    fn addclose(&mut self, fd: i32) -> anyhow::Result<()> {
        unsafe {
            check_spawn(
                "posix_spawn_file_actions_addclose",
                libc::posix_spawn_file_actions_addclose(&mut self.0, fd),
            )
        }
    }
}

impl Drop for PosixSpawnFileActions {
    fn drop(&mut self) {
        unsafe { libc::posix_spawn_file_actions_destroy(&mut self.0) };
    }
}

pub fn run_command(cmdline: &str) -> anyhow::Result<(Termination, Vec<u8>)> {
    // Spawn the shell with both stdout and stderr redirected to our pipe.
    let (pid, mut pipe) = unsafe {
        let mut pipe: [libc::c_int; 2] = std::mem::zeroed();
        check_posix("pipe", libc::pipe(pipe.as_mut_ptr()))?;

        let mut actions = PosixSpawnFileActions::new()?;
        actions.adddup2(pipe[1], 1)?;
        actions.adddup2(pipe[1], 2)?;
        actions.addclose(pipe[0])?;
        actions.addclose(pipe[1])?;

        let shell = b"/bin/sh\0".as_ptr() as *const c_char;
        let cmdline_nul = std::ffi::CString::new(cmdline)?;
        let argv: [*const c_char; 4] = [
            shell,
            b"-c\0".as_ptr() as *const c_char,
            cmdline_nul.as_ptr(),
            std::ptr::null(),
        ];

        let mut pid: libc::pid_t = 0;
        check_spawn(
            "posix_spawn",
            libc::posix_spawn(
                &mut pid,
                shell,
                actions.as_ptr(),
                std::ptr::null(),
                argv.as_ptr() as *const *mut c_char,
                std::ptr::null(),
            ),
        )?;

        check_posix("close", libc::close(pipe[1]))?;

        (pid, std::fs::File::from_raw_fd(pipe[0]))
    };

    let mut output = Vec::new();
    pipe.read_to_end(&mut output)?;

    let status = unsafe {
        let mut status: i32 = 0;
        check_posix("waitpid", libc::waitpid(pid, &mut status, 0))?;
        std::process::ExitStatus::from_raw(status)
    };

    let mut termination = Termination::Success;
    if !status.success() {
        termination = Termination::Failure;
        if let Some(sig) = status.signal() {
            match sig {
                libc::SIGINT => {
                    write!(output, "interrupted").unwrap();
                    termination = Termination::Interrupted;
                }
                _ => write!(output, "signal {}", sig).unwrap(),
            }
        }
    }

    Ok((termination, output))
}
