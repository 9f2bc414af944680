//! Store directory layout and locking.
//!
//! ```text
//! <store_path>/
//! ├─ LOCK        # advisory lock, one writer process at a time
//! └─ store.log   # framed mutation log
//! ```

use crate::error::{StoreError, StoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const LOG_FILE: &str = "store.log";

/// Application folder name under the platform data directory.
pub const APP_DIR: &str = "offsync";

/// An opened, exclusively locked store directory.
#[derive(Debug)]
pub struct StoreDir {
    path: PathBuf,
    _lock: File,
}

impl StoreDir {
    /// Opens (creating if needed) and locks a store directory.
    ///
    /// # Errors
    ///
    /// - `EnvironmentUnavailable` if the directory cannot be created
    /// - `Locked` if another process holds the lock
    pub fn open(path: &Path) -> StoreResult<Self> {
        fs::create_dir_all(path).map_err(|e| {
            StoreError::environment_unavailable(format!(
                "cannot create store directory {}: {e}",
                path.display()
            ))
        })?;

        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        lock.try_lock_exclusive().map_err(|_| StoreError::Locked)?;

        Ok(Self {
            path: path.to_path_buf(),
            _lock: lock,
        })
    }

    /// Resolves the per-user default store location.
    ///
    /// Non-interactive hosts (service accounts, bare containers) may have no
    /// data or home directory at all; that is `EnvironmentUnavailable`.
    pub fn default_path() -> StoreResult<PathBuf> {
        dirs::data_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".local").join("share")))
            .map(|base| base.join(APP_DIR))
            .ok_or_else(|| {
                StoreError::environment_unavailable("no data or home directory on this host")
            })
    }

    /// Root path of the store.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the mutation log.
    pub fn log_path(&self) -> PathBuf {
        self.path.join(LOG_FILE)
    }
}
