//! Persisted per-application user overrides.
//!
//! Layout: `<root>/<app local name>/<version>/override.json`, where `root`
//! defaults to `$XDG_CONFIG_HOME/pakbox/overrides`.

use std::path::{Path, PathBuf};

use pakbox_common::constants::OVERRIDE_FILE;
use pakbox_common::error::{PakboxError, Result};
use pakbox_common::types::AppId;

use crate::policy::{OverridePolicy, merge};

/// Reads and writes user overrides on disk.
#[derive(Debug, Clone)]
pub struct OverrideStore {
    root: PathBuf,
}

impl OverrideStore {
    /// Opens a store rooted at the given directory.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Opens the store in the user's configuration area.
    ///
    /// # Errors
    ///
    /// Returns an error if neither `$XDG_CONFIG_HOME` nor `$HOME` is set.
    pub fn open_default() -> Result<Self> {
        pakbox_common::config::overrides_dir()
            .map(Self::open)
            .ok_or_else(|| PakboxError::Config {
                message: "cannot locate a configuration directory (HOME is unset)".into(),
            })
    }

    /// Returns the root directory of the store.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the override file path for an application version.
    #[must_use]
    pub fn path(&self, app: &AppId, version: &str) -> PathBuf {
        self.root
            .join(app.local_name())
            .join(version)
            .join(OVERRIDE_FILE)
    }

    /// Loads the user override, or `None` if none was saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self, app: &AppId, version: &str) -> Result<Option<OverridePolicy>> {
        let path = self.path(app, version);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no user override");
                return Ok(None);
            }
            Err(e) => return Err(PakboxError::io(&path, e)),
        };
        let policy = OverridePolicy::from_json(&content)?;
        tracing::debug!(path = %path.display(), "loaded user override");
        Ok(Some(policy))
    }

    /// Persists a user override, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories or file cannot be written.
    pub fn save(&self, policy: &OverridePolicy, app: &AppId, version: &str) -> Result<PathBuf> {
        let path = self.path(app, version);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PakboxError::io(parent, e))?;
        }
        let json = policy.to_json()?;
        std::fs::write(&path, json).map_err(|e| PakboxError::io(&path, e))?;
        tracing::info!(path = %path.display(), app = %app, version, "saved user override");
        Ok(path)
    }

    /// Removes a user override. Returns `false` if there was none.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn delete(&self, app: &AppId, version: &str) -> Result<bool> {
        let path = self.path(app, version);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                tracing::info!(path = %path.display(), "deleted user override");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PakboxError::io(&path, e)),
        }
    }

    /// Computes the effective policy for a run of `app` at `version`.
    ///
    /// # Errors
    ///
    /// Returns an error if a stored override exists but cannot be loaded.
    pub fn effective(
        &self,
        app_default: OverridePolicy,
        app: &AppId,
        version: &str,
    ) -> Result<OverridePolicy> {
        Ok(merge(app_default, self.load(app, version)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppId {
        AppId::new("github.com/acme/editor")
    }

    #[test]
    fn path_follows_layout() {
        let store = OverrideStore::open("/cfg/pakbox/overrides");
        assert_eq!(
            store.path(&app(), "1.2.0"),
            Path::new("/cfg/pakbox/overrides/github.com_acme_editor/1.2.0/override.json")
        );
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OverrideStore::open(dir.path());
        assert!(store.load(&app(), "1.0").expect("load").is_none());
    }

    #[test]
    fn save_then_load_returns_same_policy() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OverrideStore::open(dir.path());
        let policy = OverridePolicy {
            socket_ssh_agent: true,
            fs_extra: vec!["/media/data".into()],
            ..OverridePolicy::default()
        };
        let path = store.save(&policy, &app(), "1.0").expect("save");
        assert!(path.exists());
        assert_eq!(store.load(&app(), "1.0").expect("load"), Some(policy));
    }

    #[test]
    fn versions_are_isolated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OverrideStore::open(dir.path());
        let _ = store.save(&OverridePolicy::empty(), &app(), "1.0").expect("save");
        assert!(store.load(&app(), "2.0").expect("load").is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OverrideStore::open(dir.path());
        let path = store.path(&app(), "1.0");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, "{oops").expect("write");
        assert!(store.load(&app(), "1.0").is_err());
    }

    #[test]
    fn delete_reports_presence() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OverrideStore::open(dir.path());
        assert!(!store.delete(&app(), "1.0").expect("delete"));
        let _ = store.save(&OverridePolicy::default(), &app(), "1.0").expect("save");
        assert!(store.delete(&app(), "1.0").expect("delete"));
        assert!(store.load(&app(), "1.0").expect("load").is_none());
    }

    #[test]
    fn effective_prefers_non_empty_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = OverrideStore::open(dir.path());
        let app_default = OverridePolicy::default();

        assert_eq!(
            store.effective(app_default.clone(), &app(), "1.0").expect("effective"),
            app_default
        );

        let user = OverridePolicy {
            device_all: true,
            ..OverridePolicy::empty()
        };
        let _ = store.save(&user, &app(), "1.0").expect("save");
        assert_eq!(
            store.effective(app_default, &app(), "1.0").expect("effective"),
            user
        );
    }
}
