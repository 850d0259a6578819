//! `pakbox spawn`: build a sandbox root and start its workload.
//!
//! Invoked by the outer engine inside a fresh mount namespace, never by
//! users directly.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use pakbox_common::config::{SocketWait, Verbosity};
use pakbox_common::types::{AppId, ContainerId, ContainerIdentity};
use pakbox_core::LinuxMounts;
use pakbox_policy::ResolvedPath;
use pakbox_runtime::{
    AcceleratorDiscovery, LayerStack, NamespaceConstructor, ProcessLauncher, SpawnConfig,
    StateDirLease,
};

/// Arguments for the `spawn` command.
#[derive(Args, Debug)]
pub struct SpawnArgs {
    /// Uid of the user owning the sandbox.
    #[arg(short = 'u', long)]
    pub user_uid: u32,

    /// Application identifier.
    #[arg(short = 'a', long)]
    pub app_id: String,

    /// Container identifier.
    #[arg(short = 'c', long)]
    pub container_id: String,

    /// Host path the new root is assembled at.
    #[arg(short = 'r', long)]
    pub rootfs: PathBuf,

    /// `KEY=VALUE` assignment for the workload (repeatable).
    #[arg(short = 'e', long = "env")]
    pub env: Vec<String>,

    /// `|`-separated layer identifiers in image order.
    #[arg(short = 'l', long)]
    pub layers: String,

    /// Per-sandbox state directory (overlay upper and work dirs).
    #[arg(short = 's', long)]
    pub state_dir: PathBuf,

    /// Image directory of the application.
    #[arg(short = 'i', long)]
    pub image_dir: PathBuf,

    /// Directory containing one subdirectory per layer.
    #[arg(short = 'd', long)]
    pub layers_dir: PathBuf,

    /// Host path to expose; a trailing `/` marks a directory and a trailing
    /// `:ro` a read-only bind (repeatable).
    #[arg(short = 'm', long = "mount-overrides")]
    pub mount_overrides: Vec<String>,

    /// Host command to shim through the host-exec bridge (repeatable).
    #[arg(short = 'M', long = "mount-shims")]
    pub mount_shims: Vec<String>,

    /// `source:target` link bound after everything else (repeatable).
    #[arg(short = 'x', long = "extra-links")]
    pub extra_links: Vec<String>,

    /// Seconds to wait for the control socket.
    #[arg(long, default_value_t = 30)]
    pub socket_timeout: u64,

    /// Skip GPU driver discovery.
    #[arg(long)]
    pub no_accelerators: bool,

    /// Unshare the mount namespace before building.
    #[arg(long)]
    pub unshare: bool,

    /// Workload command; defaults to an idle placeholder.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub command: Vec<String>,
}

impl SpawnArgs {
    fn into_config(self, verbosity: Verbosity) -> SpawnConfig {
        let identity = ContainerIdentity {
            app_id: AppId::new(self.app_id),
            container_id: ContainerId::new(self.container_id),
            rootfs: self.rootfs,
            state_dir: self.state_dir,
        };
        let mut config = SpawnConfig::new(identity, LayerStack::parse(&self.layers), self.layers_dir);
        config.user_uid = self.user_uid;
        config.env = self.env;
        config.image_dir = self.image_dir;
        config.mount_overrides = self
            .mount_overrides
            .iter()
            .map(|spec| ResolvedPath::from_spec(spec))
            .collect();
        config.mount_shims = self.mount_shims;
        config.extra_links = self.extra_links;
        config.command = self.command;
        config.verbosity = verbosity;
        config.socket_wait = SocketWait {
            timeout: Duration::from_secs(self.socket_timeout),
            ..SocketWait::default()
        };
        if self.no_accelerators {
            config.discovery = AcceleratorDiscovery::disabled();
        }
        config
    }
}

/// Executes the `spawn` command.
///
/// Holds the state-directory lease for the whole construction so two
/// spawns never share one overlay upper directory.
///
/// # Errors
///
/// Returns an error if the lease is taken or any construction step fails.
pub fn execute(args: SpawnArgs, verbosity: Verbosity) -> anyhow::Result<()> {
    if args.unshare {
        pakbox_core::namespace::mount::create_mount_namespace()?;
    }

    let _lease = StateDirLease::acquire(&args.state_dir)?;
    let config = args.into_config(verbosity);
    let container = config.identity.container_id.clone();

    let mut constructor = NamespaceConstructor::new(config, LinuxMounts, ProcessLauncher);
    let report = constructor.run()?;

    tracing::info!(
        container = %container,
        pid = report.pid,
        mounts = report.applied().count(),
        skipped = report.skipped().count(),
        missing = report.missing.len(),
        shims = report.shims.len(),
        "sandbox ready"
    );
    Ok(())
}
