//! # pakbox-runtime
//!
//! Sandbox construction for pakbox: turns an ordered layer stack and a
//! resolved permission policy into a pivoted root with a running workload.
//!
//! - [`layers`]: the ordered layer stack.
//! - [`plan`]: the mount planner, producing ordered mount units.
//! - [`constructor`]: the state machine executing a plan and starting the
//!   workload.
//! - [`lease`]: the per-state-directory lease held by spawn callers.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod constructor;
pub mod discovery;
pub mod hostexec;
pub mod identity;
pub mod layers;
pub mod lease;
pub mod plan;
pub mod socket;
pub mod workload;

pub use constructor::{
    ConstructionReport, ConstructionState, MountOutcome, NamespaceConstructor, SpawnConfig, SpawnEnv,
};
pub use discovery::AcceleratorDiscovery;
pub use layers::LayerStack;
pub use lease::StateDirLease;
pub use plan::{MountKind, MountPlan, MountPlanner, MountUnit, OnFailure, Stage};
pub use workload::{Launcher, ProcessLauncher};
