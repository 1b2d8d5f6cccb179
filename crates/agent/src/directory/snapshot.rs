//! Snapshot-backed directory

use super::DeviceDirectory;
use common::{DeviceRecord, DirectorySnapshot, DriveInfo, Error, Result};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Serves a fixed snapshot; clones share it, so [`SnapshotDirectory::replace`]
/// on one handle changes what every clone reports
#[derive(Debug, Clone, Default)]
pub struct SnapshotDirectory {
    snapshot: Arc<Mutex<DirectorySnapshot>>,
}

impl SnapshotDirectory {
    pub fn new(snapshot: DirectorySnapshot) -> Self {
        Self {
            snapshot: Arc::new(Mutex::new(snapshot)),
        }
    }

    /// Load a snapshot captured with [`SnapshotDirectory::save`]
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::snapshot(path, e))?;
        let snapshot: DirectorySnapshot =
            serde_json::from_str(&text).map_err(|e| Error::snapshot(path, e))?;
        info!(
            "Loaded snapshot {} ({} devices, {} drives)",
            path.display(),
            snapshot.devices.len(),
            snapshot.drives.len()
        );
        Ok(Self::new(snapshot))
    }

    /// Write a snapshot as pretty JSON
    pub fn save(snapshot: &DirectorySnapshot, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(snapshot)
            .map_err(|e| Error::snapshot(path, e))?;
        fs::write(path, text)?;
        Ok(())
    }

    /// Swap in a new snapshot
    pub fn replace(&self, snapshot: DirectorySnapshot) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
    }

    fn current(&self) -> DirectorySnapshot {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl DeviceDirectory for SnapshotDirectory {
    fn devices(&self) -> Result<Vec<DeviceRecord>> {
        Ok(self.current().devices)
    }

    fn removable_drives(&self) -> Result<Vec<DriveInfo>> {
        Ok(self.current().drives)
    }
}
