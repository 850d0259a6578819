//! The sandbox construction state machine.
//!
//! One [`NamespaceConstructor::run`] per spawn: plan, mount stage by
//! stage, pivot, mark, and hand off to the workload. Any failure moves the
//! machine to [`ConstructionState::Aborted`] and is returned as-is. Nothing
//! already mounted is undone; tearing down the namespace is left to the
//! kernel when the process exits.

use std::fmt;
use std::path::PathBuf;

use pakbox_common::config::{SocketWait, Verbosity};
use pakbox_common::constants::{CONTROL_SOCKET, env};
use pakbox_common::error::{PakboxError, Result};
use pakbox_common::types::ContainerIdentity;
use pakbox_core::MountBackend;
use pakbox_core::filesystem::mount::prepare_target;
use pakbox_policy::ResolvedPath;

use crate::discovery::AcceleratorDiscovery;
use crate::hostexec;
use crate::identity;
use crate::layers::LayerStack;
use crate::plan::{MountKind, MountPlan, MountPlanner, MountUnit, OnFailure, SkippedPath, Stage};
use crate::socket::wait_for_socket;
use crate::workload::{self, Launcher};

/// Where a construction currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructionState {
    /// Running in a private mount namespace, nothing mounted yet.
    Unshared,
    /// The overlay root is mounted.
    LayersMounted,
    /// Scratch tmpfs, pseudo-filesystems, policy paths and control socket bound.
    SystemMountsBound,
    /// Host configuration and accelerator files bound.
    ConfigInjected,
    /// Extra links bound.
    LinksBound,
    /// The process root is the new root.
    RootPivoted,
    /// The containment marker is written.
    IdentityWritten,
    /// The workload has been started and released.
    WorkloadStarted,
    /// A transition failed; the sequence stopped there.
    Aborted(String),
}

impl fmt::Display for ConstructionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unshared => f.write_str("unshared"),
            Self::LayersMounted => f.write_str("layers-mounted"),
            Self::SystemMountsBound => f.write_str("system-mounts-bound"),
            Self::ConfigInjected => f.write_str("config-injected"),
            Self::LinksBound => f.write_str("links-bound"),
            Self::RootPivoted => f.write_str("root-pivoted"),
            Self::IdentityWritten => f.write_str("identity-written"),
            Self::WorkloadStarted => f.write_str("workload-started"),
            Self::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// Result of one mount unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountOutcome {
    /// The mount is in place.
    Applied(MountUnit),
    /// A best-effort mount failed and was left out.
    Skipped {
        /// The unit that failed.
        unit: MountUnit,
        /// Why it failed.
        reason: String,
    },
}

/// What a successful construction did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstructionReport {
    /// Every planned unit, in execution order.
    pub outcomes: Vec<MountOutcome>,
    /// Host paths left out of the plan, with the reason.
    pub missing: Vec<SkippedPath>,
    /// Host-exec shim links created in the new root.
    pub shims: Vec<PathBuf>,
    /// Marker file location as seen after the pivot.
    pub marker: PathBuf,
    /// Pid of the released workload.
    pub pid: u32,
}

impl ConstructionReport {
    /// Units that were applied.
    pub fn applied(&self) -> impl Iterator<Item = &MountUnit> {
        self.outcomes.iter().filter_map(|o| match o {
            MountOutcome::Applied(unit) => Some(unit),
            MountOutcome::Skipped { .. } => None,
        })
    }

    /// Units that failed and were skipped.
    pub fn skipped(&self) -> impl Iterator<Item = (&MountUnit, &str)> {
        self.outcomes.iter().filter_map(|o| match o {
            MountOutcome::Skipped { unit, reason } => Some((unit, reason.as_str())),
            MountOutcome::Applied(_) => None,
        })
    }
}

/// Everything one spawn needs.
#[derive(Debug, Clone)]
pub struct SpawnConfig {
    /// Uid of the user the sandbox is built for.
    pub user_uid: u32,
    /// Identity of the sandbox.
    pub identity: ContainerIdentity,
    /// Raw `KEY=VALUE` assignments from the caller.
    pub env: Vec<String>,
    /// Layers in image order.
    pub layers: LayerStack,
    /// Image directory of the application.
    pub image_dir: PathBuf,
    /// Directory holding one subdirectory per layer.
    pub layers_dir: PathBuf,
    /// Resolved policy paths, bound after `/proc` and `/sys`.
    pub mount_overrides: Vec<ResolvedPath>,
    /// Extra host commands to shim, on top of `CPAK_ALLOWED_HOST_CMDS`.
    pub mount_shims: Vec<String>,
    /// `source:target` links bound last.
    pub extra_links: Vec<String>,
    /// Workload command; empty means the idle placeholder.
    pub command: Vec<String>,
    /// Verbose diagnostics.
    pub verbosity: Verbosity,
    /// Bounds on the control-socket wait.
    pub socket_wait: SocketWait,
    /// Control socket path on the host.
    pub control_socket: PathBuf,
    /// Accelerator file discovery.
    pub discovery: AcceleratorDiscovery,
    /// Remount `/` recursively private before mounting anything.
    pub make_root_private: bool,
}

impl SpawnConfig {
    /// A configuration with defaults for everything but the essentials.
    #[must_use]
    pub fn new(identity: ContainerIdentity, layers: LayerStack, layers_dir: impl Into<PathBuf>) -> Self {
        Self {
            user_uid: 0,
            identity,
            env: Vec::new(),
            layers,
            image_dir: PathBuf::new(),
            layers_dir: layers_dir.into(),
            mount_overrides: Vec::new(),
            mount_shims: Vec::new(),
            extra_links: Vec::new(),
            command: Vec::new(),
            verbosity: Verbosity::default(),
            socket_wait: SocketWait::default(),
            control_socket: PathBuf::from(CONTROL_SOCKET),
            discovery: AcceleratorDiscovery::default(),
            make_root_private: true,
        }
    }
}

/// Caller environment with the host-exec settings pulled out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpawnEnv {
    /// Assignments forwarded to the workload.
    pub forwarded: Vec<(String, String)>,
    /// Host-exec bridge socket, also forwarded.
    pub hostexec_socket: Option<String>,
    /// Commands allowed to run on the host; not forwarded.
    pub allowed_commands: Vec<String>,
}

impl SpawnEnv {
    /// Splits raw `KEY=VALUE` entries.
    ///
    /// # Errors
    ///
    /// Returns [`PakboxError::Config`] for the first entry that is not an
    /// assignment.
    pub fn split(raw: &[String]) -> Result<Self> {
        let mut out = Self::default();
        for entry in raw {
            let (key, value) = workload::parse_assignment(entry)?;
            if key == env::ALLOWED_HOST_CMDS {
                out.allowed_commands = hostexec::parse_allowed(&value);
                continue;
            }
            if key == env::HOSTEXEC_SOCKET && !value.is_empty() {
                out.hostexec_socket = Some(value.clone());
            }
            out.forwarded.push((key, value));
        }
        Ok(out)
    }
}

/// Drives one sandbox construction against a mount backend and launcher.
#[derive(Debug)]
pub struct NamespaceConstructor<B, L> {
    config: SpawnConfig,
    backend: B,
    launcher: L,
    state: ConstructionState,
}

impl<B: MountBackend, L: Launcher> NamespaceConstructor<B, L> {
    /// A constructor in the [`ConstructionState::Unshared`] state.
    pub const fn new(config: SpawnConfig, backend: B, launcher: L) -> Self {
        Self {
            config,
            backend,
            launcher,
            state: ConstructionState::Unshared,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> &ConstructionState {
        &self.state
    }

    /// Consumes the constructor, returning backend and launcher.
    pub fn into_parts(self) -> (B, L) {
        (self.backend, self.launcher)
    }

    /// Runs the whole sequence.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error; the state is then `Aborted`.
    pub fn run(&mut self) -> Result<ConstructionReport> {
        if self.state != ConstructionState::Unshared {
            return Err(PakboxError::Config {
                message: format!("constructor already ran ({})", self.state),
            });
        }

        tracing::info!(
            app = %self.config.identity.app_id,
            container = %self.config.identity.container_id,
            rootfs = %self.config.identity.rootfs.display(),
            uid = self.config.user_uid,
            image_dir = %self.config.image_dir.display(),
            layers = self.config.layers.len(),
            "constructing sandbox"
        );

        match self.execute() {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::error!(state = %self.state, error = %e, "sandbox construction aborted");
                self.state = ConstructionState::Aborted(e.to_string());
                Err(e)
            }
        }
    }

    fn execute(&mut self) -> Result<ConstructionReport> {
        let spawn_env = SpawnEnv::split(&self.config.env)?;
        let plan = self.plan()?;

        if self.config.make_root_private {
            self.backend.make_root_private()?;
        }

        let mut outcomes = Vec::with_capacity(plan.units.len());
        for (stage, next) in [
            (Stage::Layers, ConstructionState::LayersMounted),
            (Stage::System, ConstructionState::SystemMountsBound),
            (Stage::Config, ConstructionState::ConfigInjected),
            (Stage::Links, ConstructionState::LinksBound),
        ] {
            for unit in plan.stage(stage) {
                outcomes.push(self.apply(unit)?);
            }
            self.advance(next);
        }

        let shims = self.install_shims(&spawn_env)?;

        let new_root = self.backend.pivot_root(&self.config.identity.rootfs)?;
        self.advance(ConstructionState::RootPivoted);

        let marker = identity::write_marker(&new_root, &self.config.identity.app_id)?;
        self.advance(ConstructionState::IdentityWritten);

        self.launcher.refresh_linker_cache()?;
        let command = workload::effective_command(&self.config.command);
        let vars = workload::build_environment(
            &self.config.identity,
            &spawn_env.forwarded,
            &self.config.layers_dir,
            &self.config.layers,
        );
        let pid = self.launcher.launch(&command, &vars)?;
        self.advance(ConstructionState::WorkloadStarted);

        Ok(ConstructionReport {
            outcomes,
            missing: plan.skipped,
            shims,
            marker,
            pid,
        })
    }

    fn plan(&self) -> Result<MountPlan> {
        MountPlanner::new(self.config.verbosity)
            .with_control_socket(&self.config.control_socket)
            .with_discovery(self.config.discovery.clone())
            .build(
                &self.config.identity.rootfs,
                &self.config.layers.directories(&self.config.layers_dir),
                &self.config.identity.state_dir,
                &self.config.mount_overrides,
                &self.config.extra_links,
            )
    }

    fn advance(&mut self, next: ConstructionState) {
        tracing::debug!(from = %self.state, to = %next, "construction state");
        self.state = next;
    }

    fn apply(&self, unit: &MountUnit) -> Result<MountOutcome> {
        match (self.try_apply(unit), unit.on_failure) {
            (Ok(()), _) => {
                if self.config.verbosity.is_verbose() {
                    tracing::debug!(%unit, "mounted");
                }
                Ok(MountOutcome::Applied(unit.clone()))
            }
            (Err(e), OnFailure::Skip) => {
                if self.config.verbosity.is_verbose() {
                    tracing::debug!(%unit, error = %e, "best-effort mount skipped");
                }
                Ok(MountOutcome::Skipped {
                    unit: unit.clone(),
                    reason: e.to_string(),
                })
            }
            (Err(e), OnFailure::Abort) => Err(e),
        }
    }

    fn try_apply(&self, unit: &MountUnit) -> Result<()> {
        match (&unit.kind, unit.source.as_deref()) {
            (MountKind::Overlay(cfg), _) => self.backend.mount_overlay(cfg),
            (MountKind::Tmpfs, _) => {
                prepare_target(None, &unit.target, unit.target_kind)?;
                self.backend.mount_tmpfs(&unit.target)
            }
            (MountKind::Bind, Some(source)) => {
                if unit.await_source {
                    wait_for_socket(source, self.config.socket_wait)?;
                }
                prepare_target(Some(source), &unit.target, unit.target_kind)?;
                self.backend.bind(source, &unit.target, unit.flags)
            }
            (MountKind::Bind, None) => Err(PakboxError::mount(&unit.target, "bind without source")),
        }
    }

    fn install_shims(&self, spawn_env: &SpawnEnv) -> Result<Vec<PathBuf>> {
        let mut commands = spawn_env.allowed_commands.clone();
        commands.extend(self.config.mount_shims.iter().cloned());

        if commands.is_empty() || spawn_env.hostexec_socket.is_none() {
            if self.config.verbosity.is_verbose() {
                tracing::debug!("no host-exec socket or allowed commands; skipping shims");
            }
            return Ok(Vec::new());
        }
        hostexec::install_shims(&self.config.identity.rootfs, &commands)
    }
}
