//! # Layer Chain Resolution
//!
//! A layer's filesystem view is the overlay of the layer itself and all of
//! its ancestors. Each non-base layer persists its ancestors next to its
//! folder in `layerchain.json`:
//!
//! ```text
//! <home>/
//! ├── base/                      (no layerchain.json)
//! ├── update1/
//! │   └── layerchain.json        ["<home>/base"]
//! └── update2/
//!     └── layerchain.json        ["<home>/update1", "<home>/base"]
//! ```
//!
//! Resolving `update2` yields `[update2, update1, base]`: the layer first,
//! then ancestors nearest parent first. The storage driver overlays layers
//! in exactly this order, so sandbox creation, preparation and the
//! container's layer list all consume the chain unchanged.

use crate::error::{Error, Result};
use crate::host::StorageDriver;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Returns the layer ID of a layer folder: its final path component.
///
/// Both `/` and `\` separate components, so Windows paths resolve the
/// same on every host.
pub fn layer_id(path: &Path) -> String {
    let raw = path.to_string_lossy();
    raw.trim_end_matches(['/', '\\'])
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .to_string()
}

/// Decodes a persisted layer chain.
///
/// `null` and `[]` both mean "no ancestors". Any other non-array content is
/// corrupt, as is a chain naming `layer_path` itself or the same ancestor
/// twice.
pub fn parse_layer_chain(layer_path: &Path, content: &[u8]) -> Result<Option<Vec<PathBuf>>> {
    let corrupt = |reason: String| Error::StorageMetadataCorrupt {
        path: layer_path.to_path_buf(),
        reason,
    };

    let chain: Option<Vec<PathBuf>> =
        serde_json::from_slice(content).map_err(|e| corrupt(e.to_string()))?;

    let Some(chain) = chain.filter(|c| !c.is_empty()) else {
        return Ok(None);
    };

    let own_id = layer_id(layer_path);
    let mut seen = HashSet::new();
    for ancestor in &chain {
        let id = layer_id(ancestor);
        if id.is_empty() {
            return Err(corrupt(format!(
                "ancestor '{}' has no layer ID",
                ancestor.display()
            )));
        }
        if id == own_id {
            return Err(corrupt(format!("layer '{own_id}' lists itself as an ancestor")));
        }
        if !seen.insert(id.clone()) {
            return Err(corrupt(format!("ancestor '{id}' appears more than once")));
        }
    }

    Ok(Some(chain))
}

// =============================================================================
// Layer Descriptor
// =============================================================================

/// A layer as recorded by the storage driver. Read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerDescriptor {
    /// Layer ID derived from the folder name.
    pub id: String,
    /// Layer folder.
    pub path: PathBuf,
    /// Ancestor folders, nearest parent first. Empty for base layers.
    pub ancestors: Vec<PathBuf>,
}

impl LayerDescriptor {
    /// Returns true if the layer has no ancestors.
    pub fn is_base(&self) -> bool {
        self.ancestors.is_empty()
    }

    /// Returns the full chain: this layer, then its ancestors.
    pub fn chain(&self) -> LayerChain {
        let mut paths = Vec::with_capacity(self.ancestors.len() + 1);
        paths.push(self.path.clone());
        paths.extend(self.ancestors.iter().cloned());
        LayerChain { paths }
    }
}

/// Reads the descriptor of the layer at `layer_path`.
pub fn describe_layer(storage: &dyn StorageDriver, layer_path: &Path) -> Result<LayerDescriptor> {
    let ancestors = storage.read_layer_metadata(layer_path)?.unwrap_or_default();
    let descriptor = LayerDescriptor {
        id: layer_id(layer_path),
        path: layer_path.to_path_buf(),
        ancestors,
    };
    debug!(
        layer = %descriptor.id,
        ancestors = descriptor.ancestors.len(),
        "Read layer metadata"
    );
    Ok(descriptor)
}

/// Resolves the ordered chain of the layer at `layer_path`.
///
/// # Errors
///
/// [`Error::StorageMetadataCorrupt`] if metadata exists but cannot be
/// decoded. Any other driver failure reading the metadata is reported as
/// corrupt metadata too, since the chain cannot be trusted.
pub fn resolve_chain(storage: &dyn StorageDriver, layer_path: &Path) -> Result<LayerChain> {
    match describe_layer(storage, layer_path) {
        Ok(descriptor) => Ok(descriptor.chain()),
        Err(e @ Error::StorageMetadataCorrupt { .. }) => Err(e),
        Err(e) => Err(Error::StorageMetadataCorrupt {
            path: layer_path.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

// =============================================================================
// Layer Chain
// =============================================================================

/// Root-to-leaf ordered list of layer folders, head first.
///
/// Never empty: a chain always contains at least the layer it was resolved
/// from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerChain {
    paths: Vec<PathBuf>,
}

impl LayerChain {
    /// Chain consisting of a single base layer.
    pub fn base(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
        }
    }

    /// Builds a chain from ordered paths. Returns `None` if `paths` is empty.
    pub fn from_paths(paths: Vec<PathBuf>) -> Option<Self> {
        if paths.is_empty() {
            None
        } else {
            Some(Self { paths })
        }
    }

    /// The layer the chain was resolved from.
    pub fn head(&self) -> &Path {
        &self.paths[0]
    }

    /// All layer folders in overlay order.
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Layer IDs in overlay order.
    pub fn ids(&self) -> Vec<String> {
        self.paths.iter().map(|p| layer_id(p)).collect()
    }

    /// Number of layers in the chain.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Returns true if `path` is one of the chain's layers.
    pub fn contains(&self, path: &Path) -> bool {
        self.paths.iter().any(|p| p == path)
    }

    /// Iterates layer folders in overlay order.
    pub fn iter(&self) -> std::slice::Iter<'_, PathBuf> {
        self.paths.iter()
    }
}

impl<'a> IntoIterator for &'a LayerChain {
    type Item = &'a PathBuf;
    type IntoIter = std::slice::Iter<'a, PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.paths.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layer_id_from_either_separator() {
        assert_eq!(
            layer_id(Path::new(r"C:\ProgramData\docker\windowsfilter\abc123")),
            "abc123"
        );
        assert_eq!(layer_id(Path::new("/var/lib/layers/def456/")), "def456");
        assert_eq!(layer_id(Path::new("plain")), "plain");
    }

    #[test]
    fn test_parse_null_and_empty_mean_base() {
        let path = Path::new("/layers/base");
        assert_eq!(parse_layer_chain(path, b"null").unwrap(), None);
        assert_eq!(parse_layer_chain(path, b"[]").unwrap(), None);
    }

    #[test]
    fn test_parse_rejects_self_reference() {
        let path = Path::new("/layers/top");
        let err = parse_layer_chain(path, br#"["/layers/mid", "/layers/top"]"#).unwrap_err();
        assert!(matches!(err, Error::StorageMetadataCorrupt { .. }));
    }

    #[test]
    fn test_parse_rejects_duplicate_ancestor() {
        let path = Path::new("/layers/top");
        let err = parse_layer_chain(path, br#"["/layers/a", "/other/a"]"#).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_descriptor_chain_puts_self_first() {
        let descriptor = LayerDescriptor {
            id: "top".to_string(),
            path: PathBuf::from("/layers/top"),
            ancestors: vec![PathBuf::from("/layers/mid"), PathBuf::from("/layers/base")],
        };
        assert!(!descriptor.is_base());
        assert_eq!(descriptor.chain().ids(), vec!["top", "mid", "base"]);
    }
}
