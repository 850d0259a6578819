//! `OverlayFS` management for layered sandbox root filesystems.
//!
//! Stacks the image's read-only layers with a single writable upper layer
//! taken from the sandbox state directory.

use std::path::PathBuf;

use pakbox_common::error::{PakboxError, Result};

/// Configuration for an `OverlayFS` mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayConfig {
    /// Read-only lower layers, in image order.
    pub lower_dirs: Vec<PathBuf>,
    /// Writable upper layer directory.
    pub upper_dir: PathBuf,
    /// Work directory required by `OverlayFS`.
    pub work_dir: PathBuf,
    /// Final merged mount point.
    pub merged_dir: PathBuf,
    /// Store overlay metadata in `user.*` xattrs (needed without real root).
    pub user_xattr: bool,
}

impl OverlayConfig {
    /// The `lowerdir=` value: lower directories colon-joined in listed order.
    #[must_use]
    pub fn lower_dir_option(&self) -> String {
        self.lower_dirs
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    /// The full option string passed to `mount(2)`.
    #[must_use]
    pub fn mount_options(&self) -> String {
        let mut opts = format!(
            "lowerdir={},upperdir={},workdir={}",
            self.lower_dir_option(),
            self.upper_dir.display(),
            self.work_dir.display()
        );
        if self.user_xattr {
            opts.push_str(",userxattr");
        }
        opts
    }
}

/// Mounts an `OverlayFS` with the given configuration.
///
/// Creates the upper, work, and merged directories if they do not exist,
/// then issues the `mount(2)` syscall with overlay-specific options.
///
/// # Errors
///
/// Returns an error if there are no lower layers, if directory creation
/// fails, or if the mount syscall fails.
#[cfg(target_os = "linux")]
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    if config.lower_dirs.is_empty() {
        return Err(PakboxError::mount(
            &config.merged_dir,
            "overlay needs at least one lower layer",
        ));
    }

    for dir in [&config.upper_dir, &config.work_dir, &config.merged_dir] {
        std::fs::create_dir_all(dir).map_err(|e| PakboxError::io(dir, e))?;
    }

    let opts = config.mount_options();
    mount(
        Some("overlay"),
        &config.merged_dir,
        Some("overlay"),
        MsFlags::empty(),
        Some(opts.as_str()),
    )
    .map_err(|e| PakboxError::mount(&config.merged_dir, format!("overlay mount failed: {e}")))?;

    tracing::info!(
        merged = %config.merged_dir.display(),
        layers = config.lower_dirs.len(),
        "overlayfs mounted"
    );
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: `OverlayFS` mounting requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_overlay(config: &OverlayConfig) -> Result<()> {
    Err(PakboxError::mount(
        &config.merged_dir,
        "Linux required for overlay mounts",
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(lowers: &[&str]) -> OverlayConfig {
        OverlayConfig {
            lower_dirs: lowers.iter().map(PathBuf::from).collect(),
            upper_dir: PathBuf::from("/state/up"),
            work_dir: PathBuf::from("/state/work"),
            merged_dir: PathBuf::from("/rootfs"),
            user_xattr: true,
        }
    }

    #[test]
    fn lower_dirs_are_joined_in_listed_order() {
        assert_eq!(config(&["a", "b"]).lower_dir_option(), "a:b");
        assert_eq!(
            config(&["/layers/base", "/layers/mid", "/layers/top"]).lower_dir_option(),
            "/layers/base:/layers/mid:/layers/top"
        );
    }

    #[test]
    fn mount_options_include_upper_work_and_xattr() {
        assert_eq!(
            config(&["a"]).mount_options(),
            "lowerdir=a,upperdir=/state/up,workdir=/state/work,userxattr"
        );
        let mut plain = config(&["a"]);
        plain.user_xattr = false;
        assert!(!plain.mount_options().contains("userxattr"));
    }

    #[test]
    fn mounting_without_layers_fails_before_syscall() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = OverlayConfig {
            lower_dirs: Vec::new(),
            upper_dir: dir.path().join("up"),
            work_dir: dir.path().join("work"),
            merged_dir: dir.path().join("merged"),
            user_xattr: false,
        };
        assert!(mount_overlay(&cfg).is_err());
        assert!(!cfg.upper_dir.exists(), "no side effects before failing");
    }
}
