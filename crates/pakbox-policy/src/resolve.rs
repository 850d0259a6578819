//! Translation of abstract policy flags into concrete host paths.
//!
//! Resolution is a pure function of the policy and a [`HostSession`]; it
//! never looks at the filesystem. Whether a resolved path exists on the
//! host is the mount planner's concern.

use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::policy::OverridePolicy;

/// Whether a resolved path is expected to be a directory or a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// Bound over a directory created with mode 0755.
    Directory,
    /// Bound over an empty placeholder file.
    File,
}

/// Suffix marking a read-only mount spec.
const READ_ONLY_SUFFIX: &str = ":ro";

/// A host path produced by policy resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedPath {
    /// Absolute (or declared) host path, without trailing slash.
    pub path: PathBuf,
    /// Directory or file intent.
    pub kind: PathKind,
    /// Bind without write access.
    pub read_only: bool,
}

impl ResolvedPath {
    /// A writable path with directory intent.
    pub fn dir(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: PathKind::Directory,
            read_only: false,
        }
    }

    /// A writable path with file intent.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: PathKind::File,
            read_only: false,
        }
    }

    /// The same path, bound read-only.
    #[must_use]
    pub const fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    /// Parses a mount spec string.
    ///
    /// A trailing slash means directory intent; a trailing `:ro` means
    /// read-only (`/etc/:ro`).
    #[must_use]
    pub fn from_spec(spec: &str) -> Self {
        let (spec, read_only) = spec
            .strip_suffix(READ_ONLY_SUFFIX)
            .map_or((spec, false), |path| (path, true));
        let trimmed = spec.trim_end_matches('/');
        let resolved = if spec.ends_with('/') {
            Self::dir(if trimmed.is_empty() { "/" } else { trimmed })
        } else {
            Self::file(spec)
        };
        Self { read_only, ..resolved }
    }

    /// Renders the mount spec string understood by [`ResolvedPath::from_spec`].
    #[must_use]
    pub fn to_spec(&self) -> String {
        let raw = self.path.display().to_string();
        let mut spec = match self.kind {
            PathKind::Directory if raw.ends_with('/') => raw,
            PathKind::Directory => format!("{raw}/"),
            PathKind::File => raw,
        };
        if self.read_only {
            spec.push_str(READ_ONLY_SUFFIX);
        }
        spec
    }
}

impl fmt::Display for ResolvedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_spec())
    }
}

/// The per-user inputs resolution depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSession {
    /// Numeric uid owning the desktop session.
    pub uid: u32,
    /// The user's home directory.
    pub home: PathBuf,
    /// X authority files of the session: `$XAUTHORITY`, or the cookies
    /// Xwayland left in the runtime directory.
    pub xauthority: Vec<PathBuf>,
}

impl HostSession {
    /// Describes the session of the calling process.
    ///
    /// The home directory comes from `$HOME`, falling back to the passwd
    /// entry of the current uid and finally to `/`.
    #[must_use]
    pub fn current() -> Self {
        let uid = nix::unistd::getuid();
        let home = std::env::var_os("HOME")
            .map(PathBuf::from)
            .filter(|p| p.is_absolute())
            .or_else(|| {
                nix::unistd::User::from_uid(uid)
                    .ok()
                    .flatten()
                    .map(|user| user.dir)
            })
            .unwrap_or_else(|| PathBuf::from("/"));
        let xauthority = Self::xauthority_files(
            std::env::var_os("XAUTHORITY").as_deref(),
            &runtime_dir(uid.as_raw()),
        );
        Self {
            uid: uid.as_raw(),
            home,
            xauthority,
        }
    }

    /// A session for an explicit uid and home, without X authority.
    pub fn new(uid: u32, home: impl Into<PathBuf>) -> Self {
        Self {
            uid,
            home: home.into(),
            xauthority: Vec::new(),
        }
    }

    /// `xauthority` when set and non-empty, otherwise every
    /// `.*-Xwaylandauth.*` entry of `runtime_dir`, sorted.
    ///
    /// An unreadable runtime directory yields nothing.
    #[must_use]
    pub fn xauthority_files(xauthority: Option<&OsStr>, runtime_dir: &Path) -> Vec<PathBuf> {
        if let Some(path) = xauthority.filter(|v| !v.is_empty()) {
            return vec![PathBuf::from(path)];
        }
        let Ok(entries) = std::fs::read_dir(runtime_dir) else {
            return Vec::new();
        };
        let mut cookies: Vec<PathBuf> = entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| is_xwayland_cookie(&entry.file_name()))
            .map(|entry| entry.path())
            .collect();
        cookies.sort();
        cookies
    }
}

fn runtime_dir(uid: u32) -> PathBuf {
    PathBuf::from(format!("/run/user/{uid}"))
}

fn is_xwayland_cookie(name: &OsStr) -> bool {
    name.to_str()
        .and_then(|name| name.strip_prefix('.'))
        .is_some_and(|rest| rest.contains("-Xwaylandauth."))
}

/// Resolves a policy into the ordered list of host paths to expose.
///
/// Order: desktop sockets, then devices (`/dev` alone when `device_all` is
/// set, otherwise DRI, KVM, SHM), then host filesystems (root, `/etc`,
/// home, all read-only), then `/proc` when process sharing is on, then
/// `fs_extra` entries verbatim in declaration order.
#[must_use]
pub fn resolve(policy: &OverridePolicy, session: &HostSession) -> Vec<ResolvedPath> {
    resolve_with(policy, session, false)
}

/// Like [`resolve`], additionally yielding the X11 companion sockets
/// (ICE, XIM, font server, ICE authority) and the session's X authority
/// files when both X11 and Wayland are on.
#[must_use]
pub fn resolve_extended(policy: &OverridePolicy, session: &HostSession) -> Vec<ResolvedPath> {
    resolve_with(policy, session, true)
}

fn resolve_with(policy: &OverridePolicy, session: &HostSession, extended: bool) -> Vec<ResolvedPath> {
    let run = runtime_dir(session.uid);
    let mut paths = Vec::new();

    if policy.socket_x11 {
        paths.push(ResolvedPath::dir("/tmp/.X11-unix"));
        if extended {
            paths.push(ResolvedPath::dir("/tmp/.ICE-unix"));
            paths.push(ResolvedPath::dir("/tmp/.XIM-unix"));
            paths.push(ResolvedPath::dir("/tmp/.font-unix"));
            paths.push(ResolvedPath::file(run.join("ICEauthority")));
        }
    }
    if policy.socket_wayland {
        paths.push(ResolvedPath::file(run.join("wayland-0")));
    }
    if extended && policy.socket_x11 && policy.socket_wayland {
        paths.extend(session.xauthority.iter().map(|xauth| ResolvedPath::file(xauth)));
    }
    if policy.socket_pulse_audio {
        paths.push(ResolvedPath::file(run.join("pulse/native")));
    }
    if policy.socket_session_bus {
        paths.push(ResolvedPath::file(run.join("bus")));
    }
    if policy.socket_system_bus {
        paths.push(ResolvedPath::file("/run/dbus/system_bus_socket"));
    }
    if policy.socket_ssh_agent {
        paths.push(ResolvedPath::file(run.join("ssh-agent.socket")));
    }
    if policy.socket_cups {
        paths.push(ResolvedPath::file("/run/cups/cups.sock"));
    }
    if policy.socket_gpg_agent {
        paths.push(ResolvedPath::file(run.join("gnupg/S.gpg-agent")));
    }
    if policy.socket_at_spi_bus {
        paths.push(ResolvedPath::file(run.join("at-spi/bus")));
    }

    paths.extend(resolve_devices(policy));

    if policy.fs_host {
        paths.push(ResolvedPath::dir("/").into_read_only());
    }
    if policy.fs_host_etc {
        paths.push(ResolvedPath::dir("/etc").into_read_only());
    }
    if policy.fs_host_home {
        paths.push(ResolvedPath::dir(&session.home).into_read_only());
    }

    if policy.process {
        paths.push(ResolvedPath::dir("/proc"));
    }

    paths.extend(policy.fs_extra.iter().map(|p| ResolvedPath::from_spec(p)));
    paths
}

/// `device_all` wins over the individual device flags, whatever their values.
fn resolve_devices(policy: &OverridePolicy) -> Vec<ResolvedPath> {
    if policy.device_all {
        return vec![ResolvedPath::dir("/dev")];
    }
    let mut devices = Vec::new();
    if policy.device_dri {
        devices.push(ResolvedPath::dir("/dev/dri"));
    }
    if policy.device_kvm {
        devices.push(ResolvedPath::file("/dev/kvm"));
    }
    if policy.device_shm {
        devices.push(ResolvedPath::dir("/dev/shm"));
    }
    devices
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths_of(resolved: &[ResolvedPath]) -> Vec<&Path> {
        resolved.iter().map(|r| r.path.as_path()).collect()
    }

    fn session() -> HostSession {
        HostSession::new(1000, "/home/alice")
    }

    #[test]
    fn resolve_mixed_policy_matches_expected_order() {
        let policy = OverridePolicy {
            socket_x11: true,
            socket_wayland: false,
            device_all: true,
            fs_extra: vec!["/media/data".into()],
            ..OverridePolicy::empty()
        };
        let resolved = resolve(&policy, &session());
        assert_eq!(
            paths_of(&resolved),
            vec![
                Path::new("/tmp/.X11-unix"),
                Path::new("/dev"),
                Path::new("/media/data")
            ]
        );
    }

    #[test]
    fn device_all_suppresses_individual_devices() {
        for (dri, kvm, shm) in [(true, true, true), (false, true, false), (false, false, false)] {
            let policy = OverridePolicy {
                device_all: true,
                device_dri: dri,
                device_kvm: kvm,
                device_shm: shm,
                ..OverridePolicy::empty()
            };
            let resolved = resolve(&policy, &session());
            assert_eq!(paths_of(&resolved), vec![Path::new("/dev")]);
        }
    }

    #[test]
    fn individual_devices_without_device_all() {
        let policy = OverridePolicy {
            device_dri: true,
            device_kvm: true,
            device_shm: true,
            ..OverridePolicy::empty()
        };
        let resolved = resolve(&policy, &session());
        assert_eq!(
            paths_of(&resolved),
            vec![Path::new("/dev/dri"), Path::new("/dev/kvm"), Path::new("/dev/shm")]
        );
        assert_eq!(resolved[1].kind, PathKind::File);
    }

    #[test]
    fn default_policy_resolves_in_group_order() {
        let resolved = resolve(&OverridePolicy::default(), &session());
        assert_eq!(
            paths_of(&resolved),
            vec![
                Path::new("/tmp/.X11-unix"),
                Path::new("/run/user/1000/wayland-0"),
                Path::new("/run/user/1000/pulse/native"),
                Path::new("/run/user/1000/bus"),
                Path::new("/run/dbus/system_bus_socket"),
                Path::new("/run/cups/cups.sock"),
                Path::new("/dev/dri"),
                Path::new("/dev/kvm"),
                Path::new("/dev/shm"),
                Path::new("/home/alice"),
            ]
        );
    }

    #[test]
    fn every_flag_on_resolves_every_group() {
        let policy = OverridePolicy {
            socket_ssh_agent: true,
            socket_gpg_agent: true,
            socket_at_spi_bus: true,
            fs_host: true,
            fs_host_etc: true,
            process: true,
            fs_extra: vec!["/srv/a/".into(), "./rel".into()],
            ..OverridePolicy::default()
        };
        let resolved = resolve(&policy, &session());
        let paths = paths_of(&resolved);
        let pos = |p: &str| paths.iter().position(|x| *x == Path::new(p)).unwrap();
        assert!(pos("/run/user/1000/ssh-agent.socket") < pos("/run/cups/cups.sock"));
        assert!(pos("/run/user/1000/gnupg/S.gpg-agent") < pos("/run/user/1000/at-spi/bus"));
        assert!(pos("/run/user/1000/at-spi/bus") < pos("/dev/dri"));
        assert!(pos("/dev/shm") < pos("/"));
        assert!(pos("/") < pos("/etc"));
        assert!(pos("/etc") < pos("/home/alice"));
        assert!(pos("/home/alice") < pos("/proc"));
        assert_eq!(paths[paths.len() - 2], Path::new("/srv/a"));
        assert_eq!(paths[paths.len() - 1], Path::new("./rel"));
        assert_eq!(resolved[resolved.len() - 2].kind, PathKind::Directory);
    }

    #[test]
    fn resolve_is_deterministic() {
        let policy = OverridePolicy {
            fs_extra: vec!["/b".into(), "/a".into()],
            ..OverridePolicy::default()
        };
        let first = resolve(&policy, &session());
        for _ in 0..8 {
            assert_eq!(resolve(&policy, &session()), first);
        }
    }

    #[test]
    fn empty_policy_resolves_nothing() {
        assert!(resolve(&OverridePolicy::empty(), &session()).is_empty());
    }

    #[test]
    fn extended_adds_x11_companions_after_x11() {
        let mut session = session();
        session.xauthority = vec![PathBuf::from("/run/user/1000/.mutter-Xwaylandauth.ABC")];
        let policy = OverridePolicy {
            socket_x11: true,
            socket_wayland: true,
            ..OverridePolicy::empty()
        };
        let resolved = resolve_extended(&policy, &session);
        assert_eq!(
            paths_of(&resolved),
            vec![
                Path::new("/tmp/.X11-unix"),
                Path::new("/tmp/.ICE-unix"),
                Path::new("/tmp/.XIM-unix"),
                Path::new("/tmp/.font-unix"),
                Path::new("/run/user/1000/ICEauthority"),
                Path::new("/run/user/1000/wayland-0"),
                Path::new("/run/user/1000/.mutter-Xwaylandauth.ABC"),
            ]
        );
    }

    #[test]
    fn host_filesystems_resolve_read_only() {
        let policy = OverridePolicy {
            fs_host: true,
            fs_host_etc: true,
            fs_host_home: true,
            device_dri: true,
            ..OverridePolicy::empty()
        };
        let resolved = resolve(&policy, &session());
        assert_eq!(
            paths_of(&resolved),
            vec![Path::new("/dev/dri"), Path::new("/"), Path::new("/etc"), Path::new("/home/alice")]
        );
        assert!(!resolved[0].read_only);
        assert!(resolved[1..].iter().all(|r| r.read_only));
        assert_eq!(resolved[2].to_spec(), "/etc/:ro");
    }

    #[test]
    fn xauthority_variable_wins_over_runtime_cookies() {
        let run = tempfile::tempdir().expect("tempdir");
        std::fs::write(run.path().join(".mutter-Xwaylandauth.Q1"), b"").expect("write");
        let files = HostSession::xauthority_files(Some(OsStr::new("/home/alice/.Xauthority")), run.path());
        assert_eq!(files, vec![PathBuf::from("/home/alice/.Xauthority")]);
    }

    #[test]
    fn xwayland_cookies_are_found_without_xauthority() {
        let run = tempfile::tempdir().expect("tempdir");
        for name in [".mutter-Xwaylandauth.Q1", ".kwin-Xwaylandauth.Z9", "Xwaylandauth.plain", "bus"] {
            std::fs::write(run.path().join(name), b"").expect("write");
        }
        let files = HostSession::xauthority_files(Some(OsStr::new("")), run.path());
        assert_eq!(
            files,
            vec![
                run.path().join(".kwin-Xwaylandauth.Z9"),
                run.path().join(".mutter-Xwaylandauth.Q1"),
            ]
        );
        assert!(HostSession::xauthority_files(None, &run.path().join("absent")).is_empty());

        let mut session = session();
        session.xauthority = files.clone();
        let policy = OverridePolicy {
            socket_x11: true,
            socket_wayland: true,
            ..OverridePolicy::empty()
        };
        let resolved = resolve_extended(&policy, &session);
        assert_eq!(
            paths_of(&resolved[resolved.len() - 2..]),
            vec![files[0].as_path(), files[1].as_path()]
        );
        assert!(!paths_of(&resolve(&policy, &session)).contains(&files[0].as_path()));
    }

    #[test]
    fn spec_round_trip_keeps_directory_intent() {
        assert_eq!(ResolvedPath::dir("/dev/dri").to_spec(), "/dev/dri/");
        assert_eq!(ResolvedPath::from_spec("/dev/dri/"), ResolvedPath::dir("/dev/dri"));
        assert_eq!(ResolvedPath::from_spec("/run/bus"), ResolvedPath::file("/run/bus"));
        assert_eq!(ResolvedPath::from_spec("/"), ResolvedPath::dir("/"));
        assert_eq!(ResolvedPath::dir("/").to_spec(), "/");
        assert_eq!(ResolvedPath::from_spec("/etc/:ro"), ResolvedPath::dir("/etc").into_read_only());
        assert_eq!(ResolvedPath::from_spec("/run/bus:ro"), ResolvedPath::file("/run/bus").into_read_only());
    }
}
