//! Utility functions for working with paths.

use std::{
    fs::{self, Permissions},
    io,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
};

use crate::{UtilsError, UtilsResult, RPC_SOCKET_FILENAME, RUN_LOCK_FILENAME};

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Returns the RPC socket path inside the given exec root.
pub fn rpc_socket_path(exec_root: &Path) -> PathBuf {
    exec_root.join(RPC_SOCKET_FILENAME)
}

/// Returns the run-lock path that sits beside the given socket.
///
/// A socket without a parent (a bare file name) places the lock in the current directory.
pub fn run_lock_path(socket_path: &Path) -> PathBuf {
    socket_path
        .parent()
        .map(|dir| dir.join(RUN_LOCK_FILENAME))
        .unwrap_or_else(|| PathBuf::from(RUN_LOCK_FILENAME))
}

/// Creates `path` and its parents, then applies `mode` to the leaf directory.
pub fn ensure_dir_with_mode(path: &Path, mode: u32) -> UtilsResult<()> {
    fs::create_dir_all(path)?;
    fs::set_permissions(path, Permissions::from_mode(mode))?;
    Ok(())
}

/// Removes a file, treating an already missing file as success.
pub fn remove_file_if_exists(path: &Path) -> UtilsResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Fails unless `path` is absolute.
pub fn require_absolute(path: &Path) -> UtilsResult<()> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(UtilsError::PathNotAbsolute(path.to_path_buf()))
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
