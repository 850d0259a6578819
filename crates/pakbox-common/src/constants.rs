//! Fixed paths, names, and defaults shared by the sandbox engine.

use std::time::Duration;

/// Marker file written inside the new root, relative to `/`.
///
/// In-sandbox tooling checks for it to detect containment.
pub const MARKER_FILE: &str = "/tmp/.cpak";

/// Control socket created on the host by the collaborating process.
pub const CONTROL_SOCKET: &str = "/tmp/cpak.sock";

/// Directory created inside the new root to receive the old root on pivot.
pub const PIVOT_OLD_ROOT_DIR: &str = ".pivot_root";

/// Overlay upper directory name, relative to the state directory.
pub const OVERLAY_UPPER_DIR: &str = "up";

/// Overlay work directory name, relative to the state directory.
pub const OVERLAY_WORK_DIR: &str = "work";

/// Lock file taken by the spawn caller, relative to the state directory.
pub const STATE_LOCK_FILE: &str = ".lock";

/// Separator used in the `--layers` argument and `CPAK_LAYERS` value.
pub const LAYER_LIST_SEPARATOR: char = '|';

/// Where the host root is exposed inside the sandbox.
pub const HOST_ROOT_MOUNT: &str = "/run/host";

/// Host configuration files injected into every sandbox.
pub const INJECTED_CONFIG_FILES: &[&str] = &["/etc/resolv.conf", "/etc/hosts", "/etc/passwd"];

/// Host paths bound into every sandbox before policy-derived paths.
///
/// The trailing slash marks directory intent.
pub const MANDATORY_SYSTEM_MOUNTS: &[&str] = &["/proc/", "/sys/"];

/// Command started when the caller supplies none.
pub const IDLE_COMMAND: &[&str] = &["/bin/sleep", "infinity"];

/// Binary invoked to refresh the dynamic linker cache.
pub const LDCONFIG_BIN: &str = "ldconfig";

/// Path of the host-exec shim script inside the sandbox.
pub const HOSTEXEC_SHIM_PATH: &str = "/usr/local/bin/cpak-hostexec-shim";

/// Directory receiving one symlink per allowed host command.
pub const HOSTEXEC_LINK_DIR: &str = "/usr/bin";

/// Path of the pakbox binary as seen from inside the sandbox.
pub const IN_SANDBOX_BIN: &str = "/usr/local/bin/cpak";

/// Environment variable names forming the workload contract.
pub mod env {
    /// Container identifier.
    pub const CONTAINER_ID: &str = "CPAK_CONTAINER_ID";
    /// Host path of the root filesystem mount point.
    pub const ROOTFS: &str = "CPAK_ROOTFS";
    /// Host path of the state directory.
    pub const STATE_DIR: &str = "CPAK_STATE_DIR";
    /// Host path of the layers directory.
    pub const LAYERS_DIR: &str = "CPAK_LAYERS_DIR";
    /// Delimiter-joined layer list.
    pub const LAYERS: &str = "CPAK_LAYERS";
    /// Host-exec bridge socket, forwarded to the workload.
    pub const HOSTEXEC_SOCKET: &str = "CPAK_HOSTEXEC_SOCKET";
    /// Colon-separated allowed host commands, consumed by spawn.
    pub const ALLOWED_HOST_CMDS: &str = "CPAK_ALLOWED_HOST_CMDS";
}

/// Application directory under the user's configuration area.
pub const CONFIG_APP_DIR: &str = "pakbox";

/// Overrides directory under [`CONFIG_APP_DIR`].
pub const OVERRIDES_DIR: &str = "overrides";

/// File name of a persisted override.
pub const OVERRIDE_FILE: &str = "override.json";

/// Default upper bound on the control-socket wait.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// First sleep between control-socket polls.
pub const DEFAULT_SOCKET_INITIAL_BACKOFF: Duration = Duration::from_millis(10);

/// Largest sleep between control-socket polls.
pub const DEFAULT_SOCKET_MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Mode for directories created inside the new root.
pub const TARGET_DIR_MODE: u32 = 0o755;

/// Binary name for the CLI.
pub const BIN_NAME: &str = "pakbox";
