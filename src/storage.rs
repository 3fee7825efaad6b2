//! # Directory-Backed Layer Storage
//!
//! [`DirectoryDriver`] implements [`StorageDriver`] over a plain directory
//! tree laid out like the Windows filter driver's home:
//!
//! ```text
//! <home>/
//! ├── <base-id>/
//! │   └── layerchain.json       (absent for the root layer)
//! └── <sandbox-id>/
//!     ├── layerchain.json       (parent chain the sandbox was created on)
//!     ├── hcsrun-layer.json     (sandbox / active / prepared flags)
//!     └── mount/                (writable volume while prepared)
//! ```
//!
//! ## Lifecycle State
//!
//! Each sandbox layer carries a small JSON state file. Every transition
//! rewrites it through a temp file and rename, so a crash never leaves a
//! half-written state file behind.
//!
//! ## Idempotence
//!
//! Operations on a layer folder that no longer exists fail with
//! [`Error::LayerNotFound`]. Callers in the unwind path downgrade that to a
//! warning.

use crate::config::DriverInfo;
use crate::constants::{LAYER_CHAIN_FILE, LAYER_MOUNT_DIR, LAYER_STATE_FILE, validate_layer_id};
use crate::error::{Error, Result};
use crate::host::{BaseImage, StorageDriver};
use crate::layer::{layer_id, parse_layer_chain};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Lifecycle flags persisted for sandbox layers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct LayerState {
    sandbox: bool,
    active: bool,
    prepared: bool,
}

/// Layer storage driver rooted at a home directory.
///
/// ## Thread Safety
///
/// The driver holds no in-memory state; all state is on disk. Concurrent
/// operations on *different* layers are independent. A single layer must
/// have one owner, which the orchestrator guarantees.
pub struct DirectoryDriver {
    info: DriverInfo,
}

impl DirectoryDriver {
    /// Opens a driver at `info.home_dir`, creating the directory if needed.
    pub fn new(info: DriverInfo) -> Result<Self> {
        fs::create_dir_all(&info.home_dir).map_err(|e| {
            Error::host(
                format!("open layer home {}", info.home_dir.display()),
                e,
            )
        })?;

        info!("Layer store initialized at: {}", info.home_dir.display());

        Ok(Self { info })
    }

    /// Opens a driver at `home_dir` with the default flavour.
    pub fn with_path(home_dir: impl Into<PathBuf>) -> Result<Self> {
        Self::new(DriverInfo::new(home_dir))
    }

    /// Returns the home directory.
    pub fn home_dir(&self) -> &Path {
        &self.info.home_dir
    }

    /// Folder of an existing layer, or `LayerNotFound`.
    fn existing_layer(&self, id: &str) -> Result<PathBuf> {
        validate_layer_id(id).map_err(|reason| Error::InvalidLayerId {
            id: id.to_string(),
            reason: reason.to_string(),
        })?;
        let path = self.layer_path(id);
        if path.is_dir() {
            Ok(path)
        } else {
            Err(Error::LayerNotFound(id.to_string()))
        }
    }

    fn read_state(&self, layer: &Path) -> Result<LayerState> {
        match fs::read(layer.join(LAYER_STATE_FILE)) {
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(LayerState::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_state(&self, layer: &Path, state: LayerState) -> Result<()> {
        write_atomic(&layer.join(LAYER_STATE_FILE), &serde_json::to_vec(&state)?)
    }

    /// Loads state of a sandbox layer; base layers are read-only.
    fn sandbox_state(&self, id: &str) -> Result<(PathBuf, LayerState)> {
        let path = self.existing_layer(id)?;
        let state = self.read_state(&path)?;
        if !state.sandbox {
            return Err(Error::host(
                format!("modify layer {id}"),
                "layer is a read-only base layer",
            ));
        }
        Ok((path, state))
    }
}

/// Writes `data` to `path` through a uniquely named temp file and rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let temp_name = format!("tmp.{}", uuid::Uuid::now_v7());
    let temp_path = path.with_extension(temp_name);
    fs::write(&temp_path, data)?;
    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        Error::Io(e)
    })
}

impl StorageDriver for DirectoryDriver {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    fn read_layer_metadata(&self, layer_path: &Path) -> Result<Option<Vec<PathBuf>>> {
        let chain_file = layer_path.join(LAYER_CHAIN_FILE);
        match fs::read(&chain_file) {
            Ok(content) => parse_layer_chain(layer_path, &content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::StorageMetadataCorrupt {
                path: layer_path.to_path_buf(),
                reason: format!("unable to read {}: {}", chain_file.display(), e),
            }),
        }
    }

    fn create_layer(&self, id: &str, parent: &Path, chain: &[PathBuf]) -> Result<()> {
        validate_layer_id(id).map_err(|reason| Error::InvalidLayerId {
            id: id.to_string(),
            reason: reason.to_string(),
        })?;
        if chain.first().map(PathBuf::as_path) != Some(parent) {
            return Err(Error::host(
                format!("create layer {id}"),
                "parent must be the head of the layer chain",
            ));
        }
        if !parent.is_dir() {
            return Err(Error::LayerNotFound(layer_id(parent)));
        }

        let path = self.layer_path(id);
        // create_dir fails if the folder exists: IDs are never reused.
        fs::create_dir(&path)
            .map_err(|e| Error::host(format!("create layer folder {}", path.display()), e))?;

        let written = write_atomic(&path.join(LAYER_CHAIN_FILE), &serde_json::to_vec(chain)?)
            .and_then(|()| {
                self.write_state(
                    &path,
                    LayerState {
                        sandbox: true,
                        ..LayerState::default()
                    },
                )
            });
        if let Err(e) = written {
            let _ = fs::remove_dir_all(&path);
            return Err(e);
        }

        debug!(layer = %id, parent = %parent.display(), depth = chain.len(), "Created layer");
        Ok(())
    }

    fn activate_layer(&self, id: &str) -> Result<()> {
        let (path, mut state) = self.sandbox_state(id)?;
        state.active = true;
        self.write_state(&path, state)?;
        debug!(layer = %id, "Activated layer");
        Ok(())
    }

    fn prepare_layer(&self, id: &str, chain: &[PathBuf]) -> Result<()> {
        let (path, mut state) = self.sandbox_state(id)?;
        if !state.active {
            return Err(Error::host(format!("prepare layer {id}"), "layer is not active"));
        }
        if let Some(missing) = chain.iter().find(|p| !p.is_dir()) {
            return Err(Error::LayerNotFound(layer_id(missing)));
        }
        fs::create_dir_all(path.join(LAYER_MOUNT_DIR))?;
        state.prepared = true;
        self.write_state(&path, state)?;
        debug!(layer = %id, depth = chain.len(), "Prepared layer");
        Ok(())
    }

    fn unprepare_layer(&self, id: &str) -> Result<()> {
        let (path, mut state) = self.sandbox_state(id)?;
        let mount = path.join(LAYER_MOUNT_DIR);
        if mount.exists() {
            fs::remove_dir_all(&mount)?;
        }
        state.prepared = false;
        self.write_state(&path, state)?;
        debug!(layer = %id, "Unprepared layer");
        Ok(())
    }

    fn deactivate_layer(&self, id: &str) -> Result<()> {
        let (path, mut state) = self.sandbox_state(id)?;
        state.active = false;
        self.write_state(&path, state)?;
        debug!(layer = %id, "Deactivated layer");
        Ok(())
    }

    fn destroy_layer(&self, id: &str) -> Result<()> {
        let (path, _) = self.sandbox_state(id)?;
        fs::remove_dir_all(&path)?;
        debug!(layer = %id, "Destroyed layer");
        Ok(())
    }

    fn mount_path(&self, id: &str) -> Result<PathBuf> {
        let path = self.existing_layer(id)?;
        let state = self.read_state(&path)?;
        if state.prepared {
            Ok(path.join(LAYER_MOUNT_DIR))
        } else {
            Ok(path)
        }
    }

    fn base_images(&self) -> Result<Vec<BaseImage>> {
        let mut images = Vec::new();
        for entry in fs::read_dir(&self.info.home_dir)? {
            let path = entry?.path();
            if !path.is_dir() || self.read_state(&path)?.sandbox {
                continue;
            }
            images.push(BaseImage {
                id: layer_id(&path),
                path,
            });
        }
        images.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(images)
    }
}
