//! Exclusive lease on a state directory.
//!
//! The overlay upper and work directories must belong to one construction
//! at a time. The spawn caller holds this lease for the whole sequence;
//! the constructor itself takes no lock.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use pakbox_common::constants::STATE_LOCK_FILE;
use pakbox_common::error::{PakboxError, Result};

/// Advisory `flock` on `<state_dir>/.lock`, released on drop.
#[derive(Debug)]
pub struct StateDirLease {
    path: PathBuf,
    _lock: Flock<File>,
}

impl StateDirLease {
    /// Takes the lease without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`PakboxError::Config`] if another holder has the lease and
    /// an I/O error if the lock file cannot be opened.
    pub fn acquire(state_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(state_dir).map_err(|e| PakboxError::io(state_dir, e))?;
        let path = state_dir.join(STATE_LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&path)
            .map_err(|e| PakboxError::io(&path, e))?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                tracing::debug!(path = %path.display(), "state directory lease acquired");
                Ok(Self { path, _lock: lock })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(PakboxError::Config {
                message: format!("state directory in use: {}", state_dir.display()),
            }),
            Err((_, errno)) => Err(PakboxError::io(&path, std::io::Error::from(errno))),
        }
    }

    /// Path of the lock file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}
