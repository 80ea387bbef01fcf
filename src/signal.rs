//! Interrupt (SIGINT) handling.
//!
//! The first ^C also reaches the child processes, which fail and surface
//! through the normal task-failure path; our handler just latches a flag so
//! the scheduler stops issuing new work and drains what is running.

use std::sync::atomic::{AtomicBool, Ordering};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
extern "C" fn sigint_handler(_sig: libc::c_int) {
    INTERRUPTED.store(true, Ordering::Relaxed);
    // SA_RESETHAND restores the default handler, so a second ^C kills us.
}

#[cfg(unix)]
pub fn register_sigint() {
    // Safety: registering a signal handler is libc unsafe code.
    unsafe {
        let mut sa: libc::sigaction = std::mem::zeroed();
        sa.sa_sigaction = sigint_handler as libc::sighandler_t;
        sa.sa_flags = libc::SA_RESETHAND;
        libc::sigaction(libc::SIGINT, &sa, std::ptr::null_mut());
    }
}

#[cfg(not(unix))]
pub fn register_sigint() {}

pub fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}
