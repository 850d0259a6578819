//! Explicit configuration values threaded through the sandbox engine.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Whether per-step diagnostics are emitted.
///
/// Passed by value to every planner and constructor call instead of living
/// in process-wide state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verbosity {
    /// Only lifecycle milestones are logged.
    #[default]
    Quiet,
    /// Skipped host paths and every mount are logged as well.
    Verbose,
}

impl Verbosity {
    /// Returns `true` when verbose diagnostics are on.
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose)
    }
}

impl From<bool> for Verbosity {
    fn from(verbose: bool) -> Self {
        if verbose { Self::Verbose } else { Self::Quiet }
    }
}

/// Bounds for the control-socket wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketWait {
    /// Give up after this much total waiting.
    pub timeout: Duration,
    /// First sleep between polls.
    pub initial_backoff: Duration,
    /// Sleeps double up to this cap.
    pub max_backoff: Duration,
}

impl Default for SocketWait {
    fn default() -> Self {
        Self {
            timeout: constants::DEFAULT_SOCKET_TIMEOUT,
            initial_backoff: constants::DEFAULT_SOCKET_INITIAL_BACKOFF,
            max_backoff: constants::DEFAULT_SOCKET_MAX_BACKOFF,
        }
    }
}

/// Returns the user's configuration area (`$XDG_CONFIG_HOME`, else `$HOME/.config`).
#[must_use]
pub fn config_home() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
}

/// Returns the directory holding persisted overrides, if a config area exists.
#[must_use]
pub fn overrides_dir() -> Option<PathBuf> {
    config_home().map(|dir| {
        dir.join(constants::CONFIG_APP_DIR)
            .join(constants::OVERRIDES_DIR)
    })
}
