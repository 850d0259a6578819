//! Mount backend abstraction.
//!
//! The sandbox constructor issues every privileged operation through a
//! [`MountBackend`], so the same sequence can be driven against the kernel
//! or against an in-memory recorder.

use std::path::{Path, PathBuf};

use pakbox_common::error::Result;

use crate::filesystem::mount::{self, MountFlags};
use crate::filesystem::overlayfs::{self, OverlayConfig};
use crate::filesystem::pivot_root;
use crate::namespace;

/// Privileged mount operations used to build a sandbox root.
pub trait MountBackend {
    /// Makes `/` recursively private in the current mount namespace.
    ///
    /// # Errors
    ///
    /// Returns an error if the propagation change fails.
    fn make_root_private(&self) -> Result<()>;

    /// Mounts the union of the layers at the overlay's merged directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the overlay cannot be mounted.
    fn mount_overlay(&self, config: &OverlayConfig) -> Result<()>;

    /// Mounts a fresh tmpfs at `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the tmpfs cannot be mounted.
    fn mount_tmpfs(&self, target: &Path) -> Result<()>;

    /// Bind-mounts `source` onto an existing `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind fails.
    fn bind(&self, source: &Path, target: &Path, flags: MountFlags) -> Result<()>;

    /// Swaps the process root for `new_root`.
    ///
    /// Returns the path under which the new root is reachable afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be pivoted.
    fn pivot_root(&self, new_root: &Path) -> Result<PathBuf>;
}

/// Backend issuing real `mount(2)` and `pivot_root(2)` syscalls.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinuxMounts;

impl MountBackend for LinuxMounts {
    fn make_root_private(&self) -> Result<()> {
        namespace::mount::make_root_private()
    }

    fn mount_overlay(&self, config: &OverlayConfig) -> Result<()> {
        overlayfs::mount_overlay(config)
    }

    fn mount_tmpfs(&self, target: &Path) -> Result<()> {
        mount::mount_tmpfs(target)
    }

    fn bind(&self, source: &Path, target: &Path, flags: MountFlags) -> Result<()> {
        mount::bind_mount(source, target, flags)
    }

    fn pivot_root(&self, new_root: &Path) -> Result<PathBuf> {
        pivot_root::pivot_root(new_root)?;
        Ok(PathBuf::from("/"))
    }
}
