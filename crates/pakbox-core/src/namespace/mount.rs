//! Mount namespace isolation.
//!
//! Gives the sandbox its own mount table and stops mount events from
//! propagating back to the host or to sibling sandboxes.

use pakbox_common::error::{PakboxError, Result};

/// Creates a new mount namespace for the calling process.
///
/// # Errors
///
/// Returns an error if the `unshare(CLONE_NEWNS)` syscall fails.
#[cfg(target_os = "linux")]
pub fn create_mount_namespace() -> Result<()> {
    tracing::debug!("creating mount namespace");
    nix::sched::unshare(nix::sched::CloneFlags::CLONE_NEWNS).map_err(|e| PakboxError::Mount {
        target: "/".into(),
        message: format!("unshare(CLONE_NEWNS) failed: {e}"),
    })
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: mount namespaces require Linux.
#[cfg(not(target_os = "linux"))]
pub fn create_mount_namespace() -> Result<()> {
    Err(PakboxError::mount("/", "Linux required for mount namespaces"))
}

/// Remounts `/` recursively private.
///
/// Must run before any other mount of the sandbox sequence.
///
/// # Errors
///
/// Returns an error if the `mount(2)` call fails.
#[cfg(target_os = "linux")]
pub fn make_root_private() -> Result<()> {
    use nix::mount::{MsFlags, mount};

    tracing::debug!("remounting / as private");
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_PRIVATE | MsFlags::MS_REC,
        None::<&str>,
    )
    .map_err(|e| PakboxError::mount("/", format!("make rprivate failed: {e}")))
}

/// Stub for non-Linux platforms.
///
/// # Errors
///
/// Always returns an error: mount propagation requires Linux.
#[cfg(not(target_os = "linux"))]
pub fn make_root_private() -> Result<()> {
    Err(PakboxError::mount("/", "Linux required for mount propagation"))
}
