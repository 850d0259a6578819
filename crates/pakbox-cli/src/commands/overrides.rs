//! `pakbox override`: inspect and manage per-application overrides.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Subcommand};
use pakbox_common::error::PakboxError;
use pakbox_common::types::AppId;
use pakbox_policy::{HostSession, OverridePolicy, OverrideStore};

use crate::output;

/// Arguments for the `override` command.
#[derive(Args, Debug)]
pub struct OverrideArgs {
    /// Action to perform.
    #[command(subcommand)]
    pub action: OverrideAction,

    /// Override store directory (defaults to the user's configuration area).
    #[arg(long, global = true, env = "PAKBOX_OVERRIDES_DIR")]
    pub store: Option<PathBuf>,
}

/// Application version an override applies to.
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Application identifier.
    #[arg(long)]
    pub app: String,

    /// Application version.
    #[arg(long)]
    pub version: String,
}

/// Override actions.
#[derive(Subcommand, Debug)]
pub enum OverrideAction {
    /// Print the effective policy as JSON.
    Show(Target),
    /// Print the host paths the effective policy exposes.
    Resolve {
        #[command(flatten)]
        target: Target,
        /// Include X11 companion sockets and the X authority file.
        #[arg(long)]
        extended: bool,
    },
    /// Lint the stored override, listing every violation.
    Validate(Target),
    /// Store a policy read from a JSON file after linting it.
    Set {
        #[command(flatten)]
        target: Target,
        /// JSON policy file.
        #[arg(long)]
        file: PathBuf,
    },
    /// Delete the stored override.
    Reset(Target),
}

/// Executes the `override` command.
///
/// # Errors
///
/// Returns an error if the store cannot be read or written, or if the
/// policy fails validation.
pub fn execute(args: OverrideArgs) -> anyhow::Result<()> {
    let store = match args.store {
        Some(root) => OverrideStore::open(root),
        None => OverrideStore::open_default()?,
    };
    tracing::debug!(store = %store.root().display(), "override store");

    match args.action {
        OverrideAction::Show(target) => {
            let policy = effective(&store, &target)?;
            output::print_line(&policy.to_json()?);
        }
        OverrideAction::Resolve { target, extended } => {
            let policy = effective(&store, &target)?;
            let session = HostSession::current();
            let paths = if extended {
                pakbox_policy::resolve_extended(&policy, &session)
            } else {
                pakbox_policy::resolve(&policy, &session)
            };
            for path in paths {
                output::print_line(&path.to_spec());
            }
        }
        OverrideAction::Validate(target) => {
            let app = AppId::new(&target.app);
            let policy = store
                .load(&app, &target.version)?
                .ok_or_else(|| PakboxError::NotFound {
                    kind: "override",
                    id: format!("{}@{}", target.app, target.version),
                })?;
            lint(&policy)?;
            output::print_line("override is valid");
        }
        OverrideAction::Set { target, file } => {
            let raw = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let policy = OverridePolicy::from_json(&raw)?;
            lint(&policy)?;
            let path = store.save(&policy, &AppId::new(&target.app), &target.version)?;
            output::print_line(&path.display().to_string());
        }
        OverrideAction::Reset(target) => {
            let removed = store.delete(&AppId::new(&target.app), &target.version)?;
            if !removed {
                tracing::info!(app = %target.app, version = %target.version, "no override stored");
            }
        }
    }
    Ok(())
}

/// Stored override if it is not effectively empty, else the default policy.
fn effective(store: &OverrideStore, target: &Target) -> anyhow::Result<OverridePolicy> {
    let app = AppId::new(&target.app);
    Ok(store.effective(OverridePolicy::default(), &app, &target.version)?)
}

fn lint(policy: &OverridePolicy) -> anyhow::Result<()> {
    let violations = pakbox_policy::validate_syntax(policy);
    if violations.is_empty() {
        return Ok(());
    }
    output::print_violations(&violations);
    Err(PakboxError::Validation { violations }.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(store: &std::path::Path, action: OverrideAction) -> anyhow::Result<()> {
        execute(OverrideArgs {
            action,
            store: Some(store.to_path_buf()),
        })
    }

    fn target() -> Target {
        Target {
            app: "github.com/acme/editor".into(),
            version: "1.2.0".into(),
        }
    }

    #[test]
    fn set_then_reset_roundtrips_through_the_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policy_file = dir.path().join("policy.json");
        let policy = OverridePolicy {
            network: false,
            ..OverridePolicy::default()
        };
        std::fs::write(&policy_file, policy.to_json().expect("json")).expect("write");

        let store_dir = dir.path().join("store");
        run(
            &store_dir,
            OverrideAction::Set {
                target: target(),
                file: policy_file,
            },
        )
        .expect("set");

        let store = OverrideStore::open(&store_dir);
        let app = AppId::new("github.com/acme/editor");
        assert_eq!(store.load(&app, "1.2.0").expect("load"), Some(policy));

        run(&store_dir, OverrideAction::Validate(target())).expect("validate");
        run(&store_dir, OverrideAction::Reset(target())).expect("reset");
        assert_eq!(store.load(&app, "1.2.0").expect("load"), None);
    }

    #[test]
    fn set_rejects_invalid_policy_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let policy_file = dir.path().join("policy.json");
        let policy = OverridePolicy {
            env: vec!["NOVALUE".into()],
            allowed_host_commands: vec!["/usr/bin/open".into()],
            ..OverridePolicy::default()
        };
        std::fs::write(&policy_file, policy.to_json().expect("json")).expect("write");

        let store_dir = dir.path().join("store");
        let err = run(
            &store_dir,
            OverrideAction::Set {
                target: target(),
                file: policy_file,
            },
        )
        .unwrap_err();
        match err.downcast_ref::<PakboxError>() {
            Some(PakboxError::Validation { violations }) => assert_eq!(violations.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!store_dir.exists());
    }

    #[test]
    fn validate_without_stored_override_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = run(dir.path(), OverrideAction::Validate(target())).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PakboxError>(),
            Some(PakboxError::NotFound { .. })
        ));
    }
}
