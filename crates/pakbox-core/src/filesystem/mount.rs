//! Bind and tmpfs mounts, and mount-point preparation inside the new root.
//!
//! Mount points are created on demand: a directory (mode 0755) for
//! directory intent, an empty placeholder file for file intent. An existing
//! mount point is left untouched.

use std::fs::{DirBuilder, OpenOptions};
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use pakbox_common::constants::TARGET_DIR_MODE;
use pakbox_common::error::{PakboxError, Result};

/// Flags applied to a bind mount.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MountFlags {
    /// Bind the whole subtree (`MS_REC`).
    pub recursive: bool,
    /// Stop mount events propagating back to the host (`MS_PRIVATE`).
    pub private: bool,
    /// Remount read-only after binding.
    pub read_only: bool,
}

impl MountFlags {
    /// Recursive and private: the flags used for every sandbox bind.
    pub const RPRIVATE: Self = Self {
        recursive: true,
        private: true,
        read_only: false,
    };

    /// Recursive, private, and read-only.
    pub const RPRIVATE_RO: Self = Self {
        recursive: true,
        private: true,
        read_only: true,
    };
}

/// How the mount point for a bind should be created if it is missing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetKind {
    /// Create a directory tree.
    Directory,
    /// Create parent directories and an empty file.
    File,
    /// Directory if the source is a directory, file otherwise.
    MatchSource,
}

/// Ensures `target` exists so something can be mounted over it.
///
/// # Errors
///
/// Returns an error if `MatchSource` is requested for a missing source or
/// if creating the directory or file fails.
pub fn prepare_target(source: Option<&Path>, target: &Path, kind: TargetKind) -> Result<()> {
    if target.symlink_metadata().is_ok() {
        return Ok(());
    }

    let kind = match kind {
        TargetKind::MatchSource => {
            let source = source.ok_or_else(|| PakboxError::Config {
                message: format!("cannot infer mount point type for {}", target.display()),
            })?;
            let meta = std::fs::metadata(source).map_err(|e| PakboxError::io(source, e))?;
            if meta.is_dir() {
                TargetKind::Directory
            } else {
                TargetKind::File
            }
        }
        other => other,
    };

    match kind {
        TargetKind::Directory => create_dirs(target),
        _ => {
            if let Some(parent) = target.parent() {
                create_dirs(parent)?;
            }
            let _ = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(false)
                .open(target)
                .map_err(|e| PakboxError::io(target, e))?;
            tracing::trace!(target = %target.display(), "created placeholder file");
            Ok(())
        }
    }
}

fn create_dirs(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(TARGET_DIR_MODE)
        .create(path)
        .map_err(|e| PakboxError::io(path, e))
}

/// Bind-mounts `source` onto `target`.
///
/// # Errors
///
/// Returns an error if any of the `mount(2)` calls fails.
#[cfg(target_os = "linux")]
pub fn bind_mount(source: &Path, target: &Path, flags: MountFlags) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    let mut bind = MsFlags::MS_BIND;
    if flags.recursive {
        bind |= MsFlags::MS_REC;
    }
    mount(Some(source), target, None::<&str>, bind, None::<&str>).map_err(|e| {
        PakboxError::mount(target, format!("bind from {} failed: {e}", source.display()))
    })?;

    if flags.private {
        let mut propagation = MsFlags::MS_PRIVATE;
        if flags.recursive {
            propagation |= MsFlags::MS_REC;
        }
        mount(None::<&str>, target, None::<&str>, propagation, None::<&str>)
            .map_err(|e| PakboxError::mount(target, format!("make private failed: {e}")))?;
    }

    if flags.read_only {
        mount(
            None::<&str>,
            target,
            None::<&str>,
            MsFlags::MS_BIND | MsFlags::MS_REMOUNT | MsFlags::MS_RDONLY,
            None::<&str>,
        )
        .map_err(|e| PakboxError::mount(target, format!("read-only remount failed: {e}")))?;
    }

    tracing::debug!(
        source = %source.display(),
        target = %target.display(),
        ?flags,
        "bind mounted"
    );
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: bind mounts require Linux.
#[cfg(not(target_os = "linux"))]
pub fn bind_mount(_source: &Path, target: &Path, _flags: MountFlags) -> Result<()> {
    Err(PakboxError::mount(target, "Linux required for bind mounts"))
}

/// Mounts a fresh tmpfs at `target`.
///
/// # Errors
///
/// Returns an error if the `mount(2)` call fails.
#[cfg(target_os = "linux")]
pub fn mount_tmpfs(target: &Path) -> Result<()> {
    use nix::mount::{MsFlags, mount};

    mount(
        Some("tmpfs"),
        target,
        Some("tmpfs"),
        MsFlags::MS_NOSUID | MsFlags::MS_NODEV,
        Some("mode=1777"),
    )
    .map_err(|e| PakboxError::mount(target, format!("tmpfs mount failed: {e}")))?;
    tracing::debug!(target = %target.display(), "tmpfs mounted");
    Ok(())
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: tmpfs requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn mount_tmpfs(target: &Path) -> Result<()> {
    Err(PakboxError::mount(target, "Linux required for tmpfs"))
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn prepare_directory_creates_tree_with_mode() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("run/user/1000");
        prepare_target(None, &target, TargetKind::Directory).expect("prepare");
        assert!(target.is_dir());
        let mode = std::fs::metadata(&target).expect("meta").permissions().mode() & 0o777;
        // umask may only clear bits.
        assert_eq!(mode & !0o755, 0);
    }

    #[test]
    fn prepare_file_creates_empty_placeholder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("run/dbus/system_bus_socket");
        prepare_target(None, &target, TargetKind::File).expect("prepare");
        assert!(target.is_file());
        assert_eq!(std::fs::metadata(&target).expect("meta").len(), 0);
    }

    #[test]
    fn prepare_existing_target_is_untouched() {
        let dir = tempfile::tempdir().expect("tempdir");
        let target = dir.path().join("passwd");
        std::fs::write(&target, "root:x:0:0").expect("write");
        prepare_target(None, &target, TargetKind::File).expect("prepare");
        assert_eq!(std::fs::read_to_string(&target).expect("read"), "root:x:0:0");
    }

    #[test]
    fn prepare_match_source_follows_source_type() {
        let dir = tempfile::tempdir().expect("tempdir");
        let src_dir = dir.path().join("src-dir");
        let src_file = dir.path().join("src-file");
        std::fs::create_dir(&src_dir).expect("mkdir");
        std::fs::write(&src_file, "x").expect("write");

        let root = dir.path().join("root");
        prepare_target(Some(&src_dir), &root.join("a"), TargetKind::MatchSource).expect("dir");
        prepare_target(Some(&src_file), &root.join("b/c"), TargetKind::MatchSource).expect("file");
        assert!(root.join("a").is_dir());
        assert!(root.join("b/c").is_file());
    }

    #[test]
    fn prepare_match_source_without_source_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let missing = dir.path().join("missing");
        let result = prepare_target(Some(&missing), &dir.path().join("t"), TargetKind::MatchSource);
        assert!(result.is_err());
        assert!(prepare_target(None, &dir.path().join("t"), TargetKind::MatchSource).is_err());
    }
}
