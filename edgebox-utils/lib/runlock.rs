//! Single-instance guard for the daemon.
//!
//! The run-lock is an advisory, exclusive, non-blocking `flock(2)` on a file that lives beside
//! the RPC socket. The lock is released when [`RunLock::unlock`] is called or, if the process dies,
//! by the kernel when the descriptor is closed.

use std::{
    fs::{File, OpenOptions},
    os::unix::fs::OpenOptionsExt,
    path::{Path, PathBuf},
    sync::Mutex,
};

use nix::{
    errno::Errno,
    fcntl::{Flock, FlockArg},
};

use crate::{UtilsError, UtilsResult};

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

const LOCK_FILE_MODE: u32 = 0o600;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// An exclusive, process-wide lock on a well-known file.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
    held: Mutex<Option<Flock<File>>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl RunLock {
    /// Creates a lock handle for `path`. Nothing is opened until [`RunLock::try_lock`].
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            held: Mutex::new(None),
        }
    }

    /// Returns the lock file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Attempts to take the lock without blocking.
    ///
    /// Returns [`UtilsError::AlreadyRunning`] when another holder exists. Calling this again while
    /// the lock is already held by this handle is a no-op.
    pub fn try_lock(&self) -> UtilsResult<()> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if held.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .mode(LOCK_FILE_MODE)
            .open(&self.path)?;

        // On failure the descriptor is handed back and dropped here, closing it.
        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                tracing::debug!("acquired run-lock at {}", self.path.display());
                *held = Some(lock);
                Ok(())
            }
            Err((_file, errno)) if errno == Errno::EWOULDBLOCK => {
                Err(UtilsError::AlreadyRunning(self.path.clone()))
            }
            Err((_file, errno)) => Err(UtilsError::LockFailed(self.path.clone(), errno)),
        }
    }

    /// Releases the lock by closing the descriptor. Releasing an unheld lock is a no-op.
    pub fn unlock(&self) -> UtilsResult<()> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(lock) = held.take() {
            drop(lock);
            tracing::debug!("released run-lock at {}", self.path.display());
        }
        Ok(())
    }

    /// Whether this handle currently holds the lock.
    pub fn is_locked(&self) -> bool {
        self.held
            .lock()
            .map(|held| held.is_some())
            .unwrap_or(false)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn test_run_lock_admits_single_holder() -> UtilsResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("lock");

        let first = RunLock::new(&path);
        let second = RunLock::new(&path);

        first.try_lock()?;
        assert!(first.is_locked());
        assert!(matches!(
            second.try_lock(),
            Err(UtilsError::AlreadyRunning(_))
        ));
        assert!(!second.is_locked());

        first.unlock()?;
        second.try_lock()?;
        assert!(second.is_locked());
        Ok(())
    }

    #[test]
    fn test_run_lock_file_mode() -> UtilsResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("lock");

        let lock = RunLock::new(&path);
        lock.try_lock()?;

        let mode = std::fs::metadata(&path)?.permissions().mode() & 0o777;
        assert_eq!(mode & 0o077, 0);
        Ok(())
    }

    #[test]
    fn test_unlock_is_idempotent() -> UtilsResult<()> {
        let dir = tempfile::tempdir()?;
        let lock = RunLock::new(dir.path().join("lock"));

        lock.unlock()?;
        lock.try_lock()?;
        lock.try_lock()?;
        lock.unlock()?;
        lock.unlock()?;
        assert!(!lock.is_locked());
        Ok(())
    }
}
