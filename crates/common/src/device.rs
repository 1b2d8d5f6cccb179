//! Device directory snapshot types
//!
//! A directory adapter reports the devices present on the host as a flat
//! list of [`DeviceRecord`]s. The topology builder turns that list into a
//! tree; nothing here knows about hubs or ports beyond the raw strings.

use serde::{Deserialize, Serialize};

/// One device as reported by the host's device directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Unique instance identity, e.g. `USB\VID_045B&PID_0209\1-1`
    pub instance_id: String,
    /// Human-readable description
    pub description: String,
    /// Raw location path, e.g. `PCIROOT(0)#PCI(0014)#USBROOT(0)#USB(1)`
    #[serde(default)]
    pub location_path: String,
    /// Identity of the parent device, if the directory knows one
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl DeviceRecord {
    pub fn new(
        instance_id: impl Into<String>,
        description: impl Into<String>,
        location_path: impl Into<String>,
        parent_id: Option<&str>,
    ) -> Self {
        Self {
            instance_id: instance_id.into(),
            description: description.into(),
            location_path: location_path.into(),
            parent_id: parent_id.map(str::to_string),
        }
    }
}

/// A removable drive and the physical disk device backing it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveInfo {
    /// Drive name shown to the user (`E:` on Windows, `sdb` on Linux)
    pub letter: String,
    /// Instance identity of the disk device
    pub device_id: String,
}

/// A point-in-time capture of the device directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub devices: Vec<DeviceRecord>,
    #[serde(default)]
    pub drives: Vec<DriveInfo>,
}

/// Format a USB instance identity carrying a vendor/product pair
///
/// # Example
/// ```
/// use common::usb_instance_id;
///
/// assert_eq!(usb_instance_id(0x045b, 0x0209, "1-1"), r"USB\VID_045B&PID_0209\1-1");
/// ```
pub fn usb_instance_id(vendor_id: u16, product_id: u16, suffix: &str) -> String {
    format!(r"USB\VID_{:04X}&PID_{:04X}\{}", vendor_id, product_id, suffix)
}
