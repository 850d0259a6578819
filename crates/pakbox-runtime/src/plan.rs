//! Mount planning: from layers, resolved policy paths, and links to an
//! ordered list of mount units.
//!
//! The plan is built completely before the first mount is attempted, so
//! every configuration error (no layers, malformed link) surfaces while
//! the namespace is still untouched.
//!
//! Unit order:
//!
//! 1. overlay of the layers at the root
//! 2. tmpfs at `<root>/tmp`
//! 3. `/proc`, `/sys`, then the resolved policy paths (absent ones and
//!    any that would cover the root itself are skipped)
//! 4. the control socket, waited for and bound last of the system mounts
//! 5. `/etc/resolv.conf`, `/etc/hosts`, `/etc/passwd`, accelerator files
//!    (best-effort), host `/` at `<root>/run/host`
//! 6. extra links in declaration order

use std::fmt;
use std::path::{Component, Path, PathBuf};

use pakbox_common::config::Verbosity;
use pakbox_common::constants::{
    CONTROL_SOCKET, HOST_ROOT_MOUNT, INJECTED_CONFIG_FILES, MANDATORY_SYSTEM_MOUNTS,
};
use pakbox_common::error::{PakboxError, Result};
use pakbox_common::types::{upper_dir, work_dir};
use pakbox_core::{MountFlags, OverlayConfig, TargetKind};
use pakbox_policy::{PathKind, ResolvedPath};

use crate::discovery::AcceleratorDiscovery;

/// What kind of mount a unit performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountKind {
    /// Union of the image layers.
    Overlay(OverlayConfig),
    /// Fresh in-memory filesystem.
    Tmpfs,
    /// Host path exposed at another path.
    Bind,
}

/// Construction phase a unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    /// The overlay root.
    Layers,
    /// Scratch tmpfs, pseudo-filesystems, policy paths, control socket.
    System,
    /// Host configuration files, accelerator files, host root.
    Config,
    /// Caller-supplied extra links.
    Links,
}

/// What happens when a unit cannot be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OnFailure {
    /// Abort the whole construction.
    Abort,
    /// Record the unit as skipped and carry on.
    Skip,
}

/// One mount operation of a plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountUnit {
    /// Host path to mount from; `None` for overlay and tmpfs.
    pub source: Option<PathBuf>,
    /// Mount point inside the new root (as a host path).
    pub target: PathBuf,
    /// Kind of mount.
    pub kind: MountKind,
    /// Bind flags.
    pub flags: MountFlags,
    /// How to create the mount point if it is missing.
    pub target_kind: TargetKind,
    /// Phase of construction.
    pub stage: Stage,
    /// Failure handling.
    pub on_failure: OnFailure,
    /// Wait for the source to appear before binding.
    pub await_source: bool,
}

impl MountUnit {
    fn bind(source: PathBuf, target: PathBuf, target_kind: TargetKind, stage: Stage) -> Self {
        Self {
            source: Some(source),
            target,
            kind: MountKind::Bind,
            flags: MountFlags::RPRIVATE,
            target_kind,
            stage,
            on_failure: OnFailure::Abort,
            await_source: false,
        }
    }
}

impl fmt::Display for MountUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.kind, &self.source) {
            (MountKind::Overlay(cfg), _) => {
                write!(f, "overlay {} -> {}", cfg.lower_dir_option(), self.target.display())
            }
            (MountKind::Tmpfs, _) => write!(f, "tmpfs -> {}", self.target.display()),
            (MountKind::Bind, Some(src)) => {
                write!(f, "bind {} -> {}", src.display(), self.target.display())
            }
            (MountKind::Bind, None) => write!(f, "bind ? -> {}", self.target.display()),
        }
    }
}

/// A host path left out of the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedPath {
    /// The host path.
    pub path: PathBuf,
    /// Why it was left out.
    pub reason: String,
}

/// Ordered mount units plus the paths that were left out while planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountPlan {
    /// Units in execution order.
    pub units: Vec<MountUnit>,
    /// Host paths left out: absent on the host, or covering the root.
    pub skipped: Vec<SkippedPath>,
}

impl MountPlan {
    /// Units belonging to one stage, in order.
    pub fn stage(&self, stage: Stage) -> impl Iterator<Item = &MountUnit> {
        self.units.iter().filter(move |u| u.stage == stage)
    }
}

/// Returns `path` re-rooted under `root` (`/etc/hosts` → `<root>/etc/hosts`).
#[must_use]
pub fn in_root(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}

/// Whether `path`, re-rooted with [`in_root`], could leave the root.
fn climbs_out(path: &Path) -> bool {
    path.components().any(|c| c == Component::ParentDir)
}

/// Parses a `source:target` link spec.
///
/// # Errors
///
/// Returns [`PakboxError::Config`] unless the spec has exactly two
/// non-empty colon-separated components and the target has no `..`.
pub fn parse_link(spec: &str) -> Result<(PathBuf, PathBuf)> {
    let parts: Vec<&str> = spec.split(':').collect();
    match parts.as_slice() {
        [source, target] if !source.is_empty() && !target.is_empty() => {
            let target = PathBuf::from(target);
            if climbs_out(&target) {
                return Err(PakboxError::Config {
                    message: format!("invalid link {spec:?}: target must not contain '..'"),
                });
            }
            Ok((PathBuf::from(source), target))
        }
        _ => Err(PakboxError::Config {
            message: format!("invalid link {spec:?}: expected source:target"),
        }),
    }
}

/// Builds mount plans.
#[derive(Debug, Clone)]
pub struct MountPlanner {
    verbosity: Verbosity,
    control_socket: PathBuf,
    discovery: AcceleratorDiscovery,
}

impl Default for MountPlanner {
    fn default() -> Self {
        Self {
            verbosity: Verbosity::Quiet,
            control_socket: PathBuf::from(CONTROL_SOCKET),
            discovery: AcceleratorDiscovery::default(),
        }
    }
}

impl MountPlanner {
    /// A planner with default socket path and discovery roots.
    #[must_use]
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            ..Self::default()
        }
    }

    /// Overrides the control socket path.
    #[must_use]
    pub fn with_control_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.control_socket = path.into();
        self
    }

    /// Overrides where accelerator files are searched for.
    #[must_use]
    pub fn with_discovery(mut self, discovery: AcceleratorDiscovery) -> Self {
        self.discovery = discovery;
        self
    }

    /// Builds the ordered plan for one sandbox.
    ///
    /// `resolved` holds the caller's mount overrides (policy resolution
    /// output); they follow `/proc` and `/sys` and keep their read-only
    /// marks. Host paths that do not exist are left out of the plan, never
    /// an error. So is host `/`, which would cover the root; the host root
    /// is always reachable read-only at `/run/host`.
    ///
    /// # Errors
    ///
    /// Returns [`PakboxError::Mount`] if `layer_dirs` is empty and
    /// [`PakboxError::Config`] if an extra link is malformed or a link
    /// target or resolved path contains `..`.
    pub fn build(
        &self,
        root: &Path,
        layer_dirs: &[PathBuf],
        state_dir: &Path,
        resolved: &[ResolvedPath],
        extra_links: &[String],
    ) -> Result<MountPlan> {
        if layer_dirs.is_empty() {
            return Err(PakboxError::mount(root, "no layers to mount"));
        }
        let links = extra_links
            .iter()
            .map(|spec| parse_link(spec))
            .collect::<Result<Vec<_>>>()?;
        if let Some(bad) = resolved.iter().find(|r| climbs_out(&r.path)) {
            return Err(PakboxError::Config {
                message: format!("mount override {bad} must not contain '..'"),
            });
        }

        let mut plan = MountPlan {
            units: Vec::new(),
            skipped: Vec::new(),
        };

        Self::plan_layers(&mut plan, root, layer_dirs, state_dir);
        self.plan_system(&mut plan, root, resolved);
        self.plan_config(&mut plan, root);
        for (source, target) in links {
            let target = in_root(root, &target);
            plan.units.push(MountUnit::bind(source, target, TargetKind::MatchSource, Stage::Links));
        }

        tracing::info!(
            units = plan.units.len(),
            skipped = plan.skipped.len(),
            "mount plan built"
        );
        Ok(plan)
    }

    fn plan_layers(plan: &mut MountPlan, root: &Path, layer_dirs: &[PathBuf], state_dir: &Path) {
        let overlay = OverlayConfig {
            lower_dirs: layer_dirs.to_vec(),
            upper_dir: upper_dir(state_dir),
            work_dir: work_dir(state_dir),
            merged_dir: root.to_path_buf(),
            user_xattr: true,
        };
        plan.units.push(MountUnit {
            source: None,
            target: root.to_path_buf(),
            kind: MountKind::Overlay(overlay),
            flags: MountFlags::default(),
            target_kind: TargetKind::Directory,
            stage: Stage::Layers,
            on_failure: OnFailure::Abort,
            await_source: false,
        });
    }

    fn plan_system(&self, plan: &mut MountPlan, root: &Path, resolved: &[ResolvedPath]) {
        plan.units.push(MountUnit {
            source: None,
            target: root.join("tmp"),
            kind: MountKind::Tmpfs,
            flags: MountFlags::default(),
            target_kind: TargetKind::Directory,
            stage: Stage::System,
            on_failure: OnFailure::Abort,
            await_source: false,
        });

        let mandatory = MANDATORY_SYSTEM_MOUNTS.iter().map(|s| ResolvedPath::from_spec(s));
        for entry in mandatory.chain(resolved.iter().cloned()) {
            let target = in_root(root, &entry.path);
            if target == root {
                tracing::warn!(path = %entry.path.display(), "path would cover the sandbox root; skipping");
                plan.skipped.push(SkippedPath {
                    path: entry.path,
                    reason: format!("would cover the sandbox root; host root is at {HOST_ROOT_MOUNT}"),
                });
                continue;
            }
            if !host_path_exists(&entry.path) {
                if self.verbosity.is_verbose() {
                    tracing::debug!(
                        path = %entry.path.display(),
                        "host path missing, probably unsupported by the host; skipping"
                    );
                }
                plan.skipped.push(SkippedPath {
                    path: entry.path,
                    reason: "does not exist on the host".into(),
                });
                continue;
            }
            let target_kind = match entry.kind {
                PathKind::Directory => TargetKind::Directory,
                PathKind::File => TargetKind::File,
            };
            let mut unit = MountUnit::bind(entry.path, target, target_kind, Stage::System);
            if entry.read_only {
                unit.flags = MountFlags::RPRIVATE_RO;
            }
            plan.units.push(unit);
        }

        let mut socket = MountUnit::bind(
            self.control_socket.clone(),
            in_root(root, &self.control_socket),
            TargetKind::File,
            Stage::System,
        );
        socket.await_source = true;
        plan.units.push(socket);
    }

    fn plan_config(&self, plan: &mut MountPlan, root: &Path) {
        for conf in INJECTED_CONFIG_FILES {
            let source = PathBuf::from(conf);
            let target = in_root(root, &source);
            plan.units.push(MountUnit::bind(source, target, TargetKind::File, Stage::Config));
        }

        for lib in self.discovery.discover() {
            let target = in_root(root, &lib);
            let mut unit = MountUnit::bind(lib, target, TargetKind::MatchSource, Stage::Config);
            unit.on_failure = OnFailure::Skip;
            plan.units.push(unit);
        }

        let mut host_root = MountUnit::bind(
            PathBuf::from("/"),
            in_root(root, Path::new(HOST_ROOT_MOUNT)),
            TargetKind::Directory,
            Stage::Config,
        );
        host_root.flags = MountFlags::RPRIVATE_RO;
        plan.units.push(host_root);
    }
}

/// Sockets and dangling-but-present entries count as existing.
fn host_path_exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}
