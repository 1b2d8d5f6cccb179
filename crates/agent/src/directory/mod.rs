//! Device directory adapters
//!
//! A directory reports the devices currently present on the host as flat
//! records, plus the removable drives and the disk devices backing them.
//! - [`sysfs`]: Linux `/sys` walker
//! - [`snapshot`]: captured or hand-built snapshots (replays and tests)

pub mod snapshot;
pub mod sysfs;

pub use snapshot::SnapshotDirectory;
pub use sysfs::SysfsDirectory;

use common::{DeviceRecord, DirectorySnapshot, DriveInfo, Result};
use tracing::warn;

/// Source of device records
pub trait DeviceDirectory: Send + Sync {
    /// Every present device with its parent link and location string
    fn devices(&self) -> Result<Vec<DeviceRecord>>;

    /// Removable drives and the identity of their disk devices
    fn removable_drives(&self) -> Result<Vec<DriveInfo>>;

    /// Both queries, each degrading to empty on failure
    fn snapshot(&self) -> DirectorySnapshot {
        let devices = self.devices().unwrap_or_else(|e| {
            warn!("Device query failed, continuing with no devices: {}", e);
            Vec::new()
        });
        let drives = self.removable_drives().unwrap_or_else(|e| {
            warn!("Drive query failed, continuing with no drives: {}", e);
            Vec::new()
        });
        DirectorySnapshot { devices, drives }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Error;

    struct Unavailable;

    impl DeviceDirectory for Unavailable {
        fn devices(&self) -> Result<Vec<DeviceRecord>> {
            Err(Error::Directory("no access".to_string()))
        }

        fn removable_drives(&self) -> Result<Vec<DriveInfo>> {
            Err(Error::Directory("no access".to_string()))
        }
    }

    #[test]
    fn test_snapshot_degrades_to_empty() {
        let snapshot = Unavailable.snapshot();
        assert!(snapshot.devices.is_empty());
        assert!(snapshot.drives.is_empty());
    }
}
