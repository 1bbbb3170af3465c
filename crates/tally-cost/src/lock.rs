// SPDX-FileCopyrightText: 2026 Tally Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cross-process exclusive lock on a sidecar file.
//!
//! Every read-modify-write-persist cycle of the usage store runs while
//! holding this lock, so two processes sharing one store file serialize
//! their updates instead of overwriting each other. The lock is an
//! advisory `flock(2)` on Unix; elsewhere only the in-process writer gate
//! of [`crate::store::UsageStore`] applies.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use tally_core::TallyError;
use tracing::{trace, warn};

/// Path of the lock file guarding `store_path` (`usage.json` -> `usage.json.lock`).
pub fn lock_path_for(store_path: &Path) -> PathBuf {
    let mut name: OsString = store_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    store_path.with_file_name(name)
}

/// An exclusive lock held until drop.
#[derive(Debug)]
pub(crate) struct FileLock {
    #[cfg_attr(not(unix), allow(dead_code))]
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block until the exclusive lock on `path` is acquired, creating the
    /// lock file (and its parent directory) if needed.
    pub(crate) fn acquire(path: &Path) -> Result<Self, TallyError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| TallyError::persistence(path, e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| TallyError::persistence(path, e))?;

        #[cfg(unix)]
        rustix::fs::flock(&file, rustix::fs::FlockOperation::LockExclusive)
            .map_err(|e| TallyError::persistence(path, std::io::Error::from(e)))?;

        trace!(path = %path.display(), "store lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    #[cfg(unix)]
    fn unlock(&self) -> std::io::Result<()> {
        rustix::fs::flock(&self.file, rustix::fs::FlockOperation::Unlock)
            .map_err(std::io::Error::from)
    }

    #[cfg(not(unix))]
    fn unlock(&self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        match self.unlock() {
            Ok(()) => trace!(path = %self.path.display(), "store lock released"),
            // The descriptor is closed right after, which also drops the lock.
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "store lock unlock failed, releasing on close"
            ),
        }
    }
}
