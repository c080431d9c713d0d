//! Exclusive directory lock.
//!
//! One process at a time may own a store directory. The lock is an advisory
//! OS lock on `<dir>/.lock`, taken without blocking and released when the
//! [`DirLock`] is dropped.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::storage::traits::StorageError;

/// Name of the lock file inside a store directory.
pub const LOCK_FILE: &str = ".lock";

/// Held exclusive lock on a store directory.
#[derive(Debug)]
pub struct DirLock {
    _file: File,
    path: PathBuf,
}

impl DirLock {
    /// Takes the lock on `dir`, failing fast if another process holds it.
    ///
    /// # Errors
    /// - `Locked` if the lock is held elsewhere
    /// - `Io` if the lock file cannot be opened
    pub fn acquire(dir: &Path) -> Result<Self, StorageError> {
        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StorageError::Io(format!("{}: {e}", path.display())))?;

        try_lock(&file).map_err(|e| match e {
            LockFailure::Held => StorageError::Locked(format!(
                "{} is held by another process",
                path.display()
            )),
            LockFailure::Os(e) => StorageError::Io(format!("{}: {e}", path.display())),
        })?;

        Ok(Self { _file: file, path })
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

enum LockFailure {
    Held,
    Os(std::io::Error),
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), LockFailure> {
    use std::os::unix::io::AsRawFd;

    // SAFETY: the descriptor is owned by `file` and open for the whole call.
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    if err.raw_os_error() == Some(libc::EWOULDBLOCK) {
        Err(LockFailure::Held)
    } else {
        Err(LockFailure::Os(err))
    }
}

#[cfg(windows)]
fn try_lock(file: &File) -> Result<(), LockFailure> {
    use std::os::windows::io::AsRawHandle;
    use windows_sys::Win32::Foundation::{ERROR_LOCK_VIOLATION, HANDLE};
    use windows_sys::Win32::Storage::FileSystem::{
        LockFileEx, LOCKFILE_EXCLUSIVE_LOCK, LOCKFILE_FAIL_IMMEDIATELY,
    };
    use windows_sys::Win32::System::IO::OVERLAPPED;

    let handle = file.as_raw_handle() as HANDLE;
    // SAFETY: the handle is owned by `file`; OVERLAPPED is plain data and
    // zero-initialized as LockFileEx expects for offset 0.
    let ok = unsafe {
        let mut overlapped = std::mem::zeroed::<OVERLAPPED>();
        LockFileEx(
            handle,
            LOCKFILE_EXCLUSIVE_LOCK | LOCKFILE_FAIL_IMMEDIATELY,
            0,
            1,
            0,
            &mut overlapped,
        )
    };
    if ok != 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    #[allow(clippy::cast_possible_wrap)]
    let held = err.raw_os_error() == Some(ERROR_LOCK_VIOLATION as i32);
    if held {
        Err(LockFailure::Held)
    } else {
        Err(LockFailure::Os(err))
    }
}

#[cfg(not(any(unix, windows)))]
fn try_lock(_file: &File) -> Result<(), LockFailure> {
    Err(LockFailure::Os(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "directory locking is not supported on this platform",
    )))
}
