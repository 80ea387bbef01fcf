//! Queries about the attached console, used to pick a progress style.

#[cfg(unix)]
mod unix {
    pub fn use_fancy() -> bool {
        unsafe { libc::isatty(/* stdout */ 1) == 1 }
    }

    pub fn get_cols() -> Option<usize> {
        unsafe {
            let mut winsize = std::mem::zeroed::<libc::winsize>();
            if libc::ioctl(0, libc::TIOCGWINSZ, &mut winsize) < 0 {
                return None;
            }
            if winsize.ws_col < 10 {
                // Ignore claims of a too-narrow console.
                return None;
            }
            Some(winsize.ws_col as usize)
        }
    }
}

#[cfg(unix)]
pub use unix::*;

#[cfg(not(unix))]
mod fallback {
    pub fn use_fancy() -> bool {
        false
    }

    pub fn get_cols() -> Option<usize> {
        None
    }
}

#[cfg(not(unix))]
pub use fallback::*;
