//! # pakbox-core
//!
//! Low-level Linux mount primitives for the pakbox sandbox engine.
//!
//! This crate provides safe abstractions over:
//! - **Mount namespace**: `unshare(CLONE_NEWNS)` and recursive private
//!   propagation of `/`.
//! - **Filesystem**: `OverlayFS` layer stacking, bind and tmpfs mounts with
//!   on-demand mount-point creation, and `pivot_root`.
//! - **Backend**: the [`backend::MountBackend`] seam the sandbox
//!   constructor drives.
//!
//! Every syscall failure surfaces as a `PakboxError::Mount`.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod backend;
pub mod filesystem;
pub mod namespace;

pub use backend::{LinuxMounts, MountBackend};
pub use filesystem::mount::{MountFlags, TargetKind};
pub use filesystem::overlayfs::OverlayConfig;
