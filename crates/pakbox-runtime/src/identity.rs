//! The containment marker written inside every new root.

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use pakbox_common::constants::{MARKER_FILE, TARGET_DIR_MODE};
use pakbox_common::error::{PakboxError, Result};
use pakbox_common::types::AppId;

use crate::plan::in_root;

/// Writes the application id to the marker file under `root`.
///
/// `root` is the path the new root is reachable at: `/` once pivoted.
/// An existing marker is overwritten.
///
/// # Errors
///
/// Returns an I/O error if the marker cannot be written.
pub fn write_marker(root: &Path, app_id: &AppId) -> Result<PathBuf> {
    let marker = in_root(root, Path::new(MARKER_FILE));
    if let Some(parent) = marker.parent() {
        DirBuilder::new()
            .recursive(true)
            .mode(TARGET_DIR_MODE)
            .create(parent)
            .map_err(|e| PakboxError::io(parent, e))?;
    }
    std::fs::write(&marker, app_id.as_str()).map_err(|e| PakboxError::io(&marker, e))?;
    tracing::debug!(path = %marker.display(), app = %app_id, "containment marker written");
    Ok(marker)
}
