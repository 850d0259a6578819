//! Domain primitive types used across the pakbox workspace.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Unique identifier for a container instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContainerId(String);

impl ContainerId {
    /// Creates a new container ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an installed application (its origin, e.g. `github.com/foo/bar`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AppId(String);

impl AppId {
    /// Creates a new application ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns a single path component safe to use as a directory name.
    ///
    /// Path separators and colons are replaced with underscores.
    #[must_use]
    pub fn local_name(&self) -> String {
        self.0
            .chars()
            .map(|c| if matches!(c, '/' | ':' | '\\') { '_' } else { c })
            .collect()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content-addressed identifier of an extracted image layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerId(String);

impl LayerId {
    /// Creates a new layer ID from a string value.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of the sandbox being constructed by one spawn call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerIdentity {
    /// Application the sandbox runs.
    pub app_id: AppId,
    /// Container instance identifier.
    pub container_id: ContainerId,
    /// Host path the new root is assembled at.
    pub rootfs: PathBuf,
    /// Host path of the per-sandbox state directory.
    pub state_dir: PathBuf,
}

impl ContainerIdentity {
    /// Returns the overlay upper directory inside the state directory.
    #[must_use]
    pub fn upper_dir(&self) -> PathBuf {
        upper_dir(&self.state_dir)
    }

    /// Returns the overlay work directory inside the state directory.
    #[must_use]
    pub fn work_dir(&self) -> PathBuf {
        work_dir(&self.state_dir)
    }
}

/// Overlay upper directory for a state directory.
#[must_use]
pub fn upper_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(crate::constants::OVERLAY_UPPER_DIR)
}

/// Overlay work directory for a state directory.
#[must_use]
pub fn work_dir(state_dir: &Path) -> PathBuf {
    state_dir.join(crate::constants::OVERLAY_WORK_DIR)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_local_name_flattens_separators() {
        let app = AppId::new("github.com/acme/editor");
        assert_eq!(app.local_name(), "github.com_acme_editor");
    }

    #[test]
    fn identity_overlay_dirs_live_under_state_dir() {
        let identity = ContainerIdentity {
            app_id: AppId::new("app"),
            container_id: ContainerId::new("c1"),
            rootfs: PathBuf::from("/store/containers/c1"),
            state_dir: PathBuf::from("/store/states/c1"),
        };
        assert_eq!(identity.upper_dir(), Path::new("/store/states/c1/up"));
        assert_eq!(identity.work_dir(), Path::new("/store/states/c1/work"));
    }
}
