//! Host-exec shims: in-sandbox stand-ins for commands that run on the host.
//!
//! One shell script is written into the new root and every allowed
//! command gets a symlink to it under `/usr/bin`. The script forwards its
//! own name and arguments to the pakbox binary's `hostexec-client`, which
//! talks to the bridge over `CPAK_HOSTEXEC_SOCKET`.

use std::fs::{self, DirBuilder};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

use pakbox_common::constants::{HOSTEXEC_LINK_DIR, HOSTEXEC_SHIM_PATH, IN_SANDBOX_BIN, TARGET_DIR_MODE};
use pakbox_common::error::{PakboxError, Result};

use crate::plan::in_root;

/// Request sent over the host-exec socket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostExecRequest {
    /// Command and arguments to run on the host.
    pub command: Vec<String>,
    /// Initial terminal width.
    pub width: u16,
    /// Initial terminal height.
    pub height: u16,
}

/// Renders the shim script invoking `bin` inside the sandbox.
#[must_use]
pub fn render_shim(bin: &str) -> String {
    format!(
        "#!/bin/sh\n\
         # Forwards this command to the host through the pakbox host-exec bridge.\n\
         exec {bin} hostexec-client -- \"$(basename \"$0\")\" \"$@\"\n"
    )
}

/// Splits the colon-separated allowed-command list, dropping empty names.
#[must_use]
pub fn parse_allowed(list: &str) -> Vec<String> {
    list.split(':')
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Writes the shim under `root` and links each command in `commands` to it.
///
/// Existing entries at a link path are replaced. Returns the created links
/// as host paths.
///
/// # Errors
///
/// Returns [`PakboxError::Config`] for a command name containing a path
/// separator, and an I/O error if any file operation fails.
pub fn install_shims(root: &Path, commands: &[String]) -> Result<Vec<PathBuf>> {
    if let Some(bad) = commands.iter().find(|c| c.contains('/')) {
        return Err(PakboxError::Config {
            message: format!("host command {bad:?} must be a bare name"),
        });
    }

    let shim = in_root(root, Path::new(HOSTEXEC_SHIM_PATH));
    let shim_dir = shim.parent().unwrap_or(root);
    let link_dir = in_root(root, Path::new(HOSTEXEC_LINK_DIR));
    create_dir(shim_dir)?;
    create_dir(&link_dir)?;

    fs::write(&shim, render_shim(IN_SANDBOX_BIN)).map_err(|e| PakboxError::io(&shim, e))?;
    fs::set_permissions(&shim, fs::Permissions::from_mode(0o755))
        .map_err(|e| PakboxError::io(&shim, e))?;

    let target = relative_path(Path::new(HOSTEXEC_LINK_DIR), Path::new(HOSTEXEC_SHIM_PATH));
    let mut links = Vec::new();
    for name in commands.iter().filter(|c| !c.is_empty()) {
        let link = link_dir.join(name);
        if link.symlink_metadata().is_ok() {
            fs::remove_file(&link).map_err(|e| PakboxError::io(&link, e))?;
        }
        std::os::unix::fs::symlink(&target, &link).map_err(|e| PakboxError::io(&link, e))?;
        tracing::debug!(link = %link.display(), target = %target.display(), "host-exec shim linked");
        links.push(link);
    }

    tracing::info!(count = links.len(), "host-exec shims installed");
    Ok(links)
}

fn create_dir(path: &Path) -> Result<()> {
    DirBuilder::new()
        .recursive(true)
        .mode(TARGET_DIR_MODE)
        .create(path)
        .map_err(|e| PakboxError::io(path, e))
}

/// Path of absolute `to` relative to absolute directory `from`.
fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for part in &to[common..] {
        rel.push(part);
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_forwards_its_name_to_the_client() {
        let script = render_shim("/usr/local/bin/cpak");
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec /usr/local/bin/cpak hostexec-client -- \"$(basename \"$0\")\" \"$@\""));
    }

    #[test]
    fn allowed_list_is_colon_separated() {
        assert_eq!(parse_allowed("xdg-open::flatpak"), vec!["xdg-open", "flatpak"]);
        assert!(parse_allowed("").is_empty());
    }

    #[test]
    fn relative_path_walks_up_to_common_prefix() {
        assert_eq!(
            relative_path(Path::new("/usr/bin"), Path::new("/usr/local/bin/cpak-hostexec-shim")),
            PathBuf::from("../local/bin/cpak-hostexec-shim")
        );
    }

    #[test]
    fn install_writes_executable_shim_and_relative_links() {
        let root = tempfile::tempdir().expect("tempdir");
        let links = install_shims(root.path(), &["xdg-open".into(), String::new(), "code".into()])
            .expect("install");
        assert_eq!(links.len(), 2);

        let shim = root.path().join("usr/local/bin/cpak-hostexec-shim");
        let mode = fs::metadata(&shim).expect("shim").permissions().mode();
        assert_eq!(mode & 0o777, 0o755);

        let link = root.path().join("usr/bin/xdg-open");
        assert_eq!(
            fs::read_link(&link).expect("readlink"),
            PathBuf::from("../local/bin/cpak-hostexec-shim")
        );
        assert_eq!(fs::canonicalize(&link).expect("resolve"), fs::canonicalize(&shim).expect("shim"));
    }

    #[test]
    fn install_replaces_existing_entries() {
        let root = tempfile::tempdir().expect("tempdir");
        let bin = root.path().join("usr/bin");
        fs::create_dir_all(&bin).expect("mkdir");
        fs::write(bin.join("code"), b"real binary").expect("write");

        let _links = install_shims(root.path(), &["code".into()]).expect("install");
        assert!(fs::symlink_metadata(bin.join("code")).expect("meta").file_type().is_symlink());
    }

    #[test]
    fn path_like_command_is_rejected_before_writing() {
        let root = tempfile::tempdir().expect("tempdir");
        let err = install_shims(root.path(), &["../../bin/sh".into()]).unwrap_err();
        assert!(matches!(err, PakboxError::Config { .. }));
        assert!(!root.path().join("usr").exists());
    }

    #[test]
    fn request_uses_wire_field_names() {
        let req = HostExecRequest {
            command: vec!["xdg-open".into(), "https://example.org".into()],
            width: 80,
            height: 24,
        };
        let json = serde_json::to_value(&req).expect("json");
        assert_eq!(json["command"][0], "xdg-open");
        assert_eq!(json["width"], 80);
        assert_eq!(json["height"], 24);
    }
}
