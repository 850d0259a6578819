//! The ordered layer stack forming a sandbox's union filesystem.
//!
//! Layers are kept exactly in the order the image lists them and become
//! the overlay's `lowerdir` list in that order. Overlayfs gives the
//! leftmost lower directory priority, so in `a:b` a file in `a` hides the
//! same file in `b`. The order is never sorted or deduplicated.

use std::path::{Path, PathBuf};

use pakbox_common::constants::LAYER_LIST_SEPARATOR;
use pakbox_common::types::LayerId;

/// Ordered, content-addressed layer identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LayerStack {
    layers: Vec<LayerId>,
}

impl LayerStack {
    /// Parses a `|`-delimited layer list; empty entries are dropped.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self {
            layers: list
                .split(LAYER_LIST_SEPARATOR)
                .filter(|id| !id.is_empty())
                .map(LayerId::new)
                .collect(),
        }
    }

    /// Returns the layers in image order.
    #[must_use]
    pub fn layers(&self) -> &[LayerId] {
        &self.layers
    }

    /// Returns `true` when the stack has no layer.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Number of layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Host directories of each layer under `layers_dir`, in image order.
    #[must_use]
    pub fn directories(&self, layers_dir: &Path) -> Vec<PathBuf> {
        self.layers
            .iter()
            .map(|id| layers_dir.join(id.as_str()))
            .collect()
    }

    /// The `|`-joined form used on the command line and in `CPAK_LAYERS`.
    #[must_use]
    pub fn joined(&self) -> String {
        self.layers
            .iter()
            .map(LayerId::as_str)
            .collect::<Vec<_>>()
            .join(&LAYER_LIST_SEPARATOR.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_keeps_image_order() {
        let stack = LayerStack::parse("sha256-c|sha256-a|sha256-b");
        let ids: Vec<_> = stack.layers().iter().map(LayerId::as_str).collect();
        assert_eq!(ids, vec!["sha256-c", "sha256-a", "sha256-b"]);
    }

    #[test]
    fn parse_drops_empty_entries() {
        assert_eq!(LayerStack::parse("a||b|").len(), 2);
        assert!(LayerStack::parse("").is_empty());
    }

    #[test]
    fn directories_join_layers_dir() {
        let stack = LayerStack::parse("a|b");
        assert_eq!(
            stack.directories(Path::new("/store/layers")),
            vec![PathBuf::from("/store/layers/a"), PathBuf::from("/store/layers/b")]
        );
    }

    #[test]
    fn duplicates_are_preserved() {
        let stack = LayerStack::parse("a|b|a");
        assert_eq!(stack.joined(), "a|b|a");
    }
}
