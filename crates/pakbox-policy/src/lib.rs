//! # pakbox-policy
//!
//! The sandbox permission policy ("override"): which host sockets,
//! devices and filesystems an application may see.
//!
//! - [`policy`]: the data model, its desktop default, and the
//!   all-or-nothing merge of application default and user override.
//! - [`resolve`]: pure translation of flags into ordered host paths.
//! - [`validate`]: linting of the free-form lists, reporting every
//!   violation at once.
//! - [`store`]: per-application, per-version persistence as JSON.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod policy;
pub mod resolve;
pub mod store;
pub mod validate;

pub use policy::{OverridePolicy, merge};
pub use resolve::{HostSession, PathKind, ResolvedPath, resolve, resolve_extended};
pub use store::OverrideStore;
pub use validate::{ensure_valid, validate_syntax};
