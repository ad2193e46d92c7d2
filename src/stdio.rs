//! Scoped suppression of the process's standard output.
//!
//! Model runtimes print banners and progress straight to file descriptor 1,
//! bypassing `tracing`. [`StdoutGuard`] points descriptor 1 at the null
//! device until it is dropped. Guards are serialized by a process-wide lock
//! and are not reentrant.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

static REDIRECT_LOCK: Mutex<()> = Mutex::new(());

/// Restores standard output when dropped.
#[must_use = "stdout is restored as soon as the guard is dropped"]
pub struct StdoutGuard {
    #[cfg(unix)]
    saved_fd: libc::c_int,
    _lock: MutexGuard<'static, ()>,
}

#[cfg(unix)]
impl StdoutGuard {
    /// Redirect standard output to `/dev/null`.
    ///
    /// # Errors
    /// Returns the OS error if the descriptors cannot be duplicated
    pub fn suppress() -> io::Result<Self> {
        use std::os::unix::io::AsRawFd;

        let lock = REDIRECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        io::stdout().flush()?;

        let devnull = std::fs::OpenOptions::new().write(true).open("/dev/null")?;

        // SAFETY: dup only reads the descriptor table.
        let saved_fd = unsafe { libc::dup(libc::STDOUT_FILENO) };
        if saved_fd < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: both descriptors are open; dup2 atomically replaces fd 1.
        if unsafe { libc::dup2(devnull.as_raw_fd(), libc::STDOUT_FILENO) } < 0 {
            let err = io::Error::last_os_error();
            // SAFETY: saved_fd was returned by dup above and is owned here.
            unsafe { libc::close(saved_fd) };
            return Err(err);
        }

        Ok(Self {
            saved_fd,
            _lock: lock,
        })
    }
}

#[cfg(unix)]
impl Drop for StdoutGuard {
    fn drop(&mut self) {
        let _ = io::stdout().flush();
        // SAFETY: saved_fd is the duplicate taken in `suppress` and still open.
        unsafe {
            libc::dup2(self.saved_fd, libc::STDOUT_FILENO);
            libc::close(self.saved_fd);
        }
    }
}

#[cfg(not(unix))]
impl StdoutGuard {
    /// Output redirection is not supported here; the guard only serializes callers.
    pub fn suppress() -> io::Result<Self> {
        let lock = REDIRECT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        io::stdout().flush()?;
        Ok(Self { _lock: lock })
    }
}
