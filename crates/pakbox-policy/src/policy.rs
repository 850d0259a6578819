//! The override policy data model and its all-or-nothing merge.

use serde::{Deserialize, Serialize};

/// Declarative permission set controlling what of the host a sandbox sees.
///
/// Serialized with camelCase keys; a missing key deserializes to `false`
/// or an empty list, never to the desktop default.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverridePolicy {
    /// Expose the X11 socket directory.
    #[serde(default)]
    pub socket_x11: bool,
    /// Expose the Wayland compositor socket.
    #[serde(default)]
    pub socket_wayland: bool,
    /// Expose the PulseAudio native socket.
    #[serde(default)]
    pub socket_pulse_audio: bool,
    /// Expose the D-Bus session bus.
    #[serde(default)]
    pub socket_session_bus: bool,
    /// Expose the D-Bus system bus.
    #[serde(default)]
    pub socket_system_bus: bool,
    /// Expose the ssh-agent socket.
    #[serde(default)]
    pub socket_ssh_agent: bool,
    /// Expose the CUPS socket.
    #[serde(default)]
    pub socket_cups: bool,
    /// Expose the GPG agent socket.
    #[serde(default)]
    pub socket_gpg_agent: bool,
    /// Expose the AT-SPI accessibility bus.
    #[serde(default)]
    pub socket_at_spi_bus: bool,

    /// Expose `/dev/dri`.
    #[serde(default)]
    pub device_dri: bool,
    /// Expose `/dev/kvm`.
    #[serde(default)]
    pub device_kvm: bool,
    /// Expose `/dev/shm`.
    #[serde(default)]
    pub device_shm: bool,
    /// Expose all of `/dev`; supersedes the individual device flags.
    #[serde(default)]
    pub device_all: bool,

    /// Expose the host root filesystem.
    #[serde(default)]
    pub fs_host: bool,
    /// Expose host `/etc`.
    #[serde(default)]
    pub fs_host_etc: bool,
    /// Expose the user's home directory.
    #[serde(default)]
    pub fs_host_home: bool,
    /// Additional host paths, bound in declaration order.
    #[serde(default)]
    pub fs_extra: Vec<String>,

    /// Extra `KEY=VALUE` environment assignments for the workload.
    #[serde(default)]
    pub env: Vec<String>,
    /// Share the host network namespace.
    #[serde(default)]
    pub network: bool,
    /// Share the host process namespace.
    #[serde(default)]
    pub process: bool,
    /// Run the workload as root inside the sandbox.
    #[serde(default)]
    pub as_root: bool,
    /// Host commands reachable through the host-exec bridge.
    #[serde(default)]
    pub allowed_host_commands: Vec<String>,
}

impl Default for OverridePolicy {
    /// The desktop-friendly policy applications get unless they say otherwise.
    fn default() -> Self {
        Self {
            socket_x11: true,
            socket_wayland: true,
            socket_pulse_audio: true,
            socket_session_bus: true,
            socket_system_bus: true,
            socket_ssh_agent: false,
            socket_cups: true,
            socket_gpg_agent: false,
            socket_at_spi_bus: false,
            device_dri: true,
            device_kvm: true,
            device_shm: true,
            device_all: false,
            fs_host: false,
            fs_host_etc: false,
            fs_host_home: true,
            fs_extra: Vec::new(),
            env: Vec::new(),
            network: true,
            process: false,
            as_root: false,
            allowed_host_commands: Vec::new(),
        }
    }
}

impl OverridePolicy {
    /// A policy granting nothing: every flag off, every list empty.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            socket_x11: false,
            socket_wayland: false,
            socket_pulse_audio: false,
            socket_session_bus: false,
            socket_system_bus: false,
            socket_ssh_agent: false,
            socket_cups: false,
            socket_gpg_agent: false,
            socket_at_spi_bus: false,
            device_dri: false,
            device_kvm: false,
            device_shm: false,
            device_all: false,
            fs_host: false,
            fs_host_etc: false,
            fs_host_home: false,
            fs_extra: Vec::new(),
            env: Vec::new(),
            network: false,
            process: false,
            as_root: false,
            allowed_host_commands: Vec::new(),
        }
    }

    /// Returns `true` when this policy carries no user intent.
    ///
    /// That is the case when it equals the zero policy (an override file
    /// that was created but never filled in) or the built-in default (an
    /// override that was reset).
    #[must_use]
    pub fn is_effectively_empty(&self) -> bool {
        *self == Self::empty() || *self == Self::default()
    }

    /// Parses a policy from its JSON representation.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed.
    pub fn from_json(json: &str) -> pakbox_common::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Renders the policy as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> pakbox_common::error::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Picks the effective policy for a run.
///
/// The user override wins wholesale unless it is effectively empty, in
/// which case the application default is returned. Fields are never mixed.
#[must_use]
pub fn merge(app_default: OverridePolicy, user_override: Option<OverridePolicy>) -> OverridePolicy {
    match user_override {
        Some(user) if !user.is_effectively_empty() => {
            tracing::debug!("using user override policy");
            user
        }
        _ => {
            tracing::debug!("using application default policy");
            app_default
        }
    }
}
