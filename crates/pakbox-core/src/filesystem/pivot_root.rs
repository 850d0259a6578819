//! Root filesystem switching via `pivot_root(2)`.
//!
//! More secure than `chroot` because it actually changes the root mount
//! point rather than just the process's view of `/`.

use std::path::{Path, PathBuf};

use pakbox_common::constants::PIVOT_OLD_ROOT_DIR;
use pakbox_common::error::{PakboxError, Result};

/// Returns the directory that receives the old root for `new_root`.
#[must_use]
pub fn put_old_dir(new_root: &Path) -> PathBuf {
    new_root.join(PIVOT_OLD_ROOT_DIR)
}

/// Switches the root filesystem to `new_root` and changes directory to `/`.
///
/// The old root stays mounted under `/.pivot_root`; the sandbox keeps it
/// until the mount namespace is torn down.
///
/// # Errors
///
/// Returns an error if creating the put-old directory, `pivot_root(2)`, or
/// `chdir(2)` fails.
#[cfg(target_os = "linux")]
pub fn pivot_root(new_root: &Path) -> Result<()> {
    let put_old = put_old_dir(new_root);
    std::fs::create_dir_all(&put_old).map_err(|e| PakboxError::io(&put_old, e))?;

    tracing::info!(new_root = %new_root.display(), "performing pivot_root");
    nix::unistd::pivot_root(new_root, &put_old)
        .map_err(|e| PakboxError::mount(new_root, format!("pivot_root failed: {e}")))?;
    nix::unistd::chdir("/")
        .map_err(|e| PakboxError::mount(new_root, format!("chdir to new root failed: {e}")))?;
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: `pivot_root` requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn pivot_root(new_root: &Path) -> Result<()> {
    Err(PakboxError::mount(new_root, "Linux required for pivot_root"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_old_lives_inside_new_root() {
        assert_eq!(
            put_old_dir(Path::new("/store/containers/c1")),
            Path::new("/store/containers/c1/.pivot_root")
        );
    }
}
