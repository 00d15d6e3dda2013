// src/lock/run_lock.rs

//! Cross-process advisory run lock.
//!
//! On Linux the lock is an exclusive open-file-description (`F_OFD_SETLK`)
//! record lock over the whole file, and [`RunLock::locked`] asks the kernel
//! with `F_OFD_GETLK` without taking it. Other Unix systems use `flock(2)`
//! and answer `locked` from the holder PID recorded in the file.
//!
//! Acquisition never blocks: contention is reported as `Ok(None)`, which
//! callers treat as "a run is already in progress". The lock itself is the
//! kernel lock, not the file's presence.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{AgentError, Result};

use super::ensure_parent_dir;

/// A run lock keyed by a filesystem path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Try to take the lock without blocking.
    ///
    /// Returns `Ok(Some(guard))` when acquired and `Ok(None)` when another
    /// holder (in this or any other process) has it. Filesystem failures are
    /// returned as [`AgentError::LockError`].
    pub fn try_acquire(&self) -> Result<Option<RunLockGuard>> {
        ensure_parent_dir(&self.path)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .map_err(|e| self.lock_error(e))?;

        if !try_lock_exclusive(&file).map_err(|e| self.lock_error(e))? {
            return Ok(None);
        }

        write_holder_pid(&mut file).map_err(|e| self.lock_error(e))?;
        debug!(lockfile = %self.path.display(), "run lock acquired");

        Ok(Some(RunLockGuard {
            file,
            path: self.path.clone(),
        }))
    }

    /// Whether some holder currently has the lock. Never takes the lock.
    pub fn locked(&self) -> Result<bool> {
        let file = match OpenOptions::new().read(true).open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(self.lock_error(e)),
        };
        held_elsewhere(&file).map_err(|e| self.lock_error(e))
    }

    /// PID recorded by the current holder, if the file names one.
    pub fn holder_pid(&self) -> Option<u32> {
        let mut contents = String::new();
        File::open(&self.path)
            .and_then(|mut f| f.read_to_string(&mut contents))
            .ok()?;
        contents.trim().parse().ok()
    }

    fn lock_error(&self, source: io::Error) -> AgentError {
        AgentError::LockError {
            path: self.path.clone(),
            source,
        }
    }
}

/// Scoped ownership of a [`RunLock`]; the lock is released on drop.
pub struct RunLockGuard {
    file: File,
    path: PathBuf,
}

impl RunLockGuard {
    /// Release the lock now instead of at the end of the scope.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for RunLockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLockGuard")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl Drop for RunLockGuard {
    fn drop(&mut self) {
        if let Err(e) = self.file.set_len(0) {
            debug!(lockfile = %self.path.display(), error = %e, "could not clear lock holder pid");
        }
        unlock(&self.file);
        debug!(lockfile = %self.path.display(), "run lock released");
    }
}

fn write_holder_pid(file: &mut File) -> io::Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    write!(file, "{}", std::process::id())?;
    file.flush()
}

#[cfg(target_os = "linux")]
fn whole_file(kind: libc::c_int) -> libc::flock {
    // SAFETY: `flock` is plain old data; all-zero is a valid value.
    let mut region: libc::flock = unsafe { std::mem::zeroed() };
    region.l_type = kind as libc::c_short;
    region.l_whence = libc::SEEK_SET as libc::c_short;
    region
}

/// Try to take the exclusive lock (non-blocking).
///
/// Returns `Ok(true)` if the lock was acquired, `Ok(false)` if it is held
/// through another open file description.
#[cfg(target_os = "linux")]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let region = whole_file(libc::F_WRLCK);
    // SAFETY: `fd` is owned by `file` and `region` outlives the call.
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_OFD_SETLK, &region) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::EAGAIN) | Some(libc::EACCES) => Ok(false),
        _ => Err(err),
    }
}

#[cfg(target_os = "linux")]
fn held_elsewhere(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    let mut region = whole_file(libc::F_WRLCK);
    // SAFETY: `fd` is owned by `file` and `region` is a valid out-pointer.
    if unsafe { libc::fcntl(file.as_raw_fd(), libc::F_OFD_GETLK, &mut region) } != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(region.l_type != libc::F_UNLCK as libc::c_short)
}

#[cfg(target_os = "linux")]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    let region = whole_file(libc::F_UNLCK);
    // SAFETY: `fd` is owned by `file` and `region` outlives the call.
    unsafe {
        libc::fcntl(file.as_raw_fd(), libc::F_OFD_SETLK, &region);
    }
}

#[cfg(all(unix, not(target_os = "linux")))]
fn try_lock_exclusive(file: &File) -> io::Result<bool> {
    use std::os::unix::io::AsRawFd;
    // SAFETY: `fd` is a valid descriptor owned by `file` for the whole call.
    if unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) } == 0 {
        return Ok(true);
    }
    let err = io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        return Ok(false);
    }
    Err(err)
}

/// A live PID in the file means the lock is held.
#[cfg(all(unix, not(target_os = "linux")))]
fn held_elsewhere(file: &File) -> io::Result<bool> {
    let mut contents = String::new();
    (&*file).read_to_string(&mut contents)?;
    let Ok(pid) = contents.trim().parse::<libc::pid_t>() else {
        return Ok(false);
    };
    // SAFETY: signal 0 only checks that `pid` exists.
    if unsafe { libc::kill(pid, 0) } == 0 {
        return Ok(true);
    }
    Ok(io::Error::last_os_error().raw_os_error() == Some(libc::EPERM))
}

#[cfg(all(unix, not(target_os = "linux")))]
fn unlock(file: &File) {
    use std::os::unix::io::AsRawFd;
    // SAFETY: `fd` is a valid descriptor owned by `file` for the whole call.
    unsafe {
        libc::flock(file.as_raw_fd(), libc::LOCK_UN);
    }
}

#[cfg(not(unix))]
fn try_lock_exclusive(_file: &File) -> io::Result<bool> {
    Ok(true)
}

#[cfg(not(unix))]
fn held_elsewhere(_file: &File) -> io::Result<bool> {
    Ok(false)
}

#[cfg(not(unix))]
fn unlock(_file: &File) {}
