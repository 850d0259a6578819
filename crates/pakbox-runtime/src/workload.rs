//! Workload hand-off: linker cache refresh and detached process start.
//!
//! The constructor never waits on the workload. Liveness supervision
//! belongs to whoever called spawn.

use std::path::PathBuf;
use std::process::{Command, Stdio};

use pakbox_common::constants::{IDLE_COMMAND, LDCONFIG_BIN, env};
use pakbox_common::error::{PakboxError, Result};
use pakbox_common::types::ContainerIdentity;

use crate::layers::LayerStack;

/// Starts processes inside the pivoted root.
pub trait Launcher {
    /// Rebuilds the dynamic linker cache of the new root.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache cannot be refreshed.
    fn refresh_linker_cache(&mut self) -> Result<()>;

    /// Starts `command` detached with `env` added to the inherited
    /// environment. Returns the child pid.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be started.
    fn launch(&mut self, command: &[String], env: &[(String, String)]) -> Result<u32>;
}

/// Launcher backed by `std::process::Command`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessLauncher;

impl Launcher for ProcessLauncher {
    fn refresh_linker_cache(&mut self) -> Result<()> {
        let ldconfig = which::which(LDCONFIG_BIN).unwrap_or_else(|_| PathBuf::from("/sbin/ldconfig"));
        tracing::debug!(bin = %ldconfig.display(), "refreshing linker cache");

        let status = Command::new(&ldconfig)
            .stdin(Stdio::null())
            .status()
            .map_err(|e| PakboxError::io(&ldconfig, e))?;
        if !status.success() {
            return Err(PakboxError::Config {
                message: format!("{} exited with {status}", ldconfig.display()),
            });
        }
        Ok(())
    }

    fn launch(&mut self, command: &[String], env: &[(String, String)]) -> Result<u32> {
        let (program, args) = command.split_first().ok_or_else(|| PakboxError::Config {
            message: "workload command is empty".into(),
        })?;

        let child = Command::new(program)
            .args(args)
            .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .spawn()
            .map_err(|e| PakboxError::io(program, e))?;
        let pid = child.id();
        tracing::info!(pid, cmd = ?command, "workload started");
        drop(child);
        Ok(pid)
    }
}

/// The command to run: the caller's, or the idle placeholder.
#[must_use]
pub fn effective_command(command: &[String]) -> Vec<String> {
    if command.is_empty() {
        IDLE_COMMAND.iter().map(|s| (*s).to_string()).collect()
    } else {
        command.to_vec()
    }
}

/// Splits a `KEY=VALUE` assignment on the first `=`.
///
/// # Errors
///
/// Returns [`PakboxError::Config`] if there is no `=` or the key is empty.
pub fn parse_assignment(entry: &str) -> Result<(String, String)> {
    match entry.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(PakboxError::Config {
            message: format!("invalid environment entry {entry:?}: expected KEY=VALUE"),
        }),
    }
}

/// Environment added on top of the inherited host environment.
///
/// Caller assignments come first, the `CPAK_*` identity variables last,
/// so the identity always wins.
#[must_use]
pub fn build_environment(
    identity: &ContainerIdentity,
    caller_env: &[(String, String)],
    layers_dir: &std::path::Path,
    layers: &LayerStack,
) -> Vec<(String, String)> {
    let mut vars = caller_env.to_vec();
    vars.extend([
        (env::CONTAINER_ID.to_string(), identity.container_id.to_string()),
        (env::ROOTFS.to_string(), identity.rootfs.display().to_string()),
        (env::STATE_DIR.to_string(), identity.state_dir.display().to_string()),
        (env::LAYERS_DIR.to_string(), layers_dir.display().to_string()),
        (env::LAYERS.to_string(), layers.joined()),
    ]);
    vars
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use pakbox_common::types::{AppId, ContainerId};

    use super::*;

    fn identity() -> ContainerIdentity {
        ContainerIdentity {
            app_id: AppId::new("org.example.App"),
            container_id: ContainerId::new("c1"),
            rootfs: PathBuf::from("/var/lib/pakbox/c1/rootfs"),
            state_dir: PathBuf::from("/var/lib/pakbox/c1/state"),
        }
    }

    #[test]
    fn empty_command_falls_back_to_idle() {
        assert_eq!(effective_command(&[]), vec!["/bin/sleep", "infinity"]);
        assert_eq!(effective_command(&["/bin/app".into()]), vec!["/bin/app"]);
    }

    #[test]
    fn assignments_split_on_first_equals() {
        assert_eq!(
            parse_assignment("A=b=c").expect("assignment"),
            ("A".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_assignment("EMPTY=").expect("assignment"), ("EMPTY".into(), String::new()));
        for bad in ["novalue", "=x"] {
            let err = parse_assignment(bad).unwrap_err();
            assert!(matches!(err, PakboxError::Config { .. }), "{bad}: {err}");
        }
    }

    #[test]
    fn environment_carries_identity_after_caller_vars() {
        let vars = build_environment(
            &identity(),
            &[("LANG".into(), "C".into()), (env::CONTAINER_ID.into(), "spoofed".into())],
            Path::new("/store/layers"),
            &LayerStack::parse("a|b"),
        );

        assert_eq!(vars[0], ("LANG".into(), "C".into()));
        let last = |key: &str| {
            vars.iter()
                .rev()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        };
        assert_eq!(last(env::CONTAINER_ID).as_deref(), Some("c1"));
        assert_eq!(last(env::ROOTFS).as_deref(), Some("/var/lib/pakbox/c1/rootfs"));
        assert_eq!(last(env::STATE_DIR).as_deref(), Some("/var/lib/pakbox/c1/state"));
        assert_eq!(last(env::LAYERS_DIR).as_deref(), Some("/store/layers"));
        assert_eq!(last(env::LAYERS).as_deref(), Some("a|b"));
    }

    #[test]
    fn launch_rejects_empty_command() {
        let err = ProcessLauncher.launch(&[], &[]).unwrap_err();
        assert!(matches!(err, PakboxError::Config { .. }));
    }

    #[test]
    fn launch_returns_child_pid() {
        let pid = ProcessLauncher
            .launch(&["true".into()], &[("PAKBOX_TEST".into(), "1".into())])
            .expect("launch");
        assert!(pid > 0);
    }
}
