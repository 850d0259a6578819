//! Discovery of host GPU driver files to expose inside the sandbox.
//!
//! Searches fixed vendor-named locations for NVIDIA configuration files,
//! utilities, and libraries. Results are bound best-effort: some of the
//! matches are transient and may be gone by the time they are mounted.

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

/// Vendor configuration files searched for under `/usr`.
const VENDOR_CONFIG_PATTERNS: &[&str] = &[
    "glvnd/egl_vendor.d/10_nvidia.json",
    "X11/xorg.conf.d/10-nvidia.conf",
    "X11/xorg.conf.d/nvidia-drm-outputclass.conf",
    "egl/egl_external_platform.d/10_nvidia_wayland.json",
    "egl/egl_external_platform.d/15_nvidia_gbm.json",
    "nvidia/nvoptix.bin",
    "vulkan/icd.d/nvidia_icd.json",
    "vulkan/icd.d/nvidia_layers.json",
    "vulkan/implicit_layer.d/nvidia_layers.json",
    "nvidia.icd",
    "nvidia.yaml",
    "nvidia.json",
];

/// How files under a search root are selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Matcher {
    /// Any file whose path mentions the vendor.
    VendorPath,
    /// Files whose path ends in one of the known vendor config locations.
    VendorConfig,
    /// Executables whose name mentions the vendor.
    Binary,
    /// Shared objects of the vendor driver or CUDA runtime.
    Library,
}

impl Matcher {
    fn matches(self, path: &Path, name: &str) -> bool {
        match self {
            Self::VendorPath => path.to_string_lossy().contains("nvidia"),
            Self::VendorConfig => {
                let path = path.to_string_lossy();
                VENDOR_CONFIG_PATTERNS.iter().any(|pat| path.contains(pat))
            }
            Self::Binary => name.to_lowercase().contains("nvidia"),
            Self::Library => {
                name.starts_with("libnvcuvid")
                    || name.starts_with("libnvoptix")
                    || (name.contains(".so") && (name.contains("nvidia") || name.contains("cuda")))
            }
        }
    }
}

/// A directory tree searched with one matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRoot {
    /// Directory to walk.
    pub base: PathBuf,
    /// Selection rule for files found under it.
    pub matcher: Matcher,
}

impl SearchRoot {
    /// A search root for `base` using `matcher`.
    pub fn new(base: impl Into<PathBuf>, matcher: Matcher) -> Self {
        Self {
            base: base.into(),
            matcher,
        }
    }
}

/// Where to look for accelerator files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceleratorDiscovery {
    roots: Vec<SearchRoot>,
}

impl Default for AcceleratorDiscovery {
    fn default() -> Self {
        Self {
            roots: vec![
                SearchRoot::new("/etc", Matcher::VendorPath),
                SearchRoot::new("/usr", Matcher::VendorConfig),
                SearchRoot::new("/bin", Matcher::Binary),
                SearchRoot::new("/sbin", Matcher::Binary),
                SearchRoot::new("/usr/bin", Matcher::Binary),
                SearchRoot::new("/usr/sbin", Matcher::Binary),
                SearchRoot::new("/usr/lib", Matcher::Library),
                SearchRoot::new("/usr/lib64", Matcher::Library),
                SearchRoot::new("/usr/lib32", Matcher::Library),
            ],
        }
    }
}

impl AcceleratorDiscovery {
    /// Discovery over explicit roots.
    #[must_use]
    pub const fn with_roots(roots: Vec<SearchRoot>) -> Self {
        Self { roots }
    }

    /// Discovery that never finds anything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { roots: Vec::new() }
    }

    /// Walks every root and returns matching files.
    ///
    /// Missing roots and unreadable entries are ignored. Paths with a
    /// hidden component below their root are dropped and duplicates
    /// removed, keeping the first occurrence.
    #[must_use]
    pub fn discover(&self) -> Vec<PathBuf> {
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for root in &self.roots {
            if !root.base.is_dir() {
                continue;
            }
            for entry in WalkDir::new(&root.base)
                .follow_links(false)
                .into_iter()
                .filter_map(Result::ok)
            {
                if entry.file_type().is_dir() {
                    continue;
                }
                let path = entry.path();
                let name = entry.file_name().to_string_lossy();
                let relative = path.strip_prefix(&root.base).unwrap_or(path);
                if !root.matcher.matches(path, &name) || is_hidden(relative) {
                    continue;
                }
                if seen.insert(path.to_path_buf()) {
                    found.push(path.to_path_buf());
                }
            }
        }

        tracing::debug!(count = found.len(), "accelerator files discovered");
        found
    }
}

fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| match c {
        Component::Normal(part) => part.to_string_lossy().starts_with('.'),
        _ => false,
    })
}
