//! Test utilities for the USB Insight Hub agent
//!
//! Builds directory snapshots shaped like a real host so tree, pairing and
//! classification tests can run without hardware.
//!
//! # Example
//!
//! ```
//! use common::test_utils::SnapshotBuilder;
//!
//! let mut builder = SnapshotBuilder::new();
//! let host = builder.add_host("0014");
//! let hub = builder.add_insight_hub(&host, "1", "15", "COM5");
//! builder.add_device(&hub.hub2_id, "HID Keyboard Device", Some("4"));
//!
//! let snapshot = builder.build();
//! assert!(snapshot.devices.len() > 5);
//! ```

use crate::device::{DeviceRecord, DirectorySnapshot, DriveInfo, usb_instance_id};
use std::future::Future;
use std::time::Duration;

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Vendor/product of the USB2 half of the Insight Hub
pub const HUB2_IDS: (u16, u16) = (0x045B, 0x0209);
/// Vendor/product of the USB3 half of the Insight Hub
pub const HUB3_IDS: (u16, u16) = (0x045B, 0x0210);
/// Vendor/product of the onboard display controller
pub const CONTROLLER_IDS: (u16, u16) = (0x303A, 0x1001);

/// A host controller and its root hub
#[derive(Debug, Clone)]
pub struct HostPaths {
    pub controller_id: String,
    pub root_hub_id: String,
    pub root_location: String,
}

/// The nodes of one Insight Hub added by [`SnapshotBuilder::add_insight_hub`]
#[derive(Debug, Clone)]
pub struct InsightHubPaths {
    pub hub2_id: String,
    pub hub2_location: String,
    pub hub3_id: String,
    pub hub3_location: String,
    pub controller_id: String,
}

/// Incrementally builds a [`DirectorySnapshot`]
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    devices: Vec<DeviceRecord>,
    drives: Vec<DriveInfo>,
    next_serial: u32,
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn serial(&mut self) -> u32 {
        self.next_serial += 1;
        self.next_serial
    }

    fn location_of(&self, id: &str) -> String {
        self.devices
            .iter()
            .find(|d| d.instance_id == id)
            .map(|d| d.location_path.clone())
            .unwrap_or_default()
    }

    /// Push a raw record
    pub fn push(&mut self, record: DeviceRecord) -> &mut Self {
        self.devices.push(record);
        self
    }

    /// Add an xHCI controller at a PCI slot with its root hub
    pub fn add_host(&mut self, pci_slot: &str) -> HostPaths {
        let controller_id = format!(r"PCI\VEN_8086&DEV_A36D\{}", pci_slot);
        let controller_location = format!("PCIROOT(0)#PCI({})", pci_slot);
        let root_hub_id = format!(r"USB\ROOT_HUB30\{}", pci_slot);
        let root_location = format!("{}#USBROOT(0)", controller_location);

        self.devices.push(DeviceRecord::new(
            &controller_id,
            "USB xHCI Compliant Host Controller",
            &controller_location,
            None,
        ));
        self.devices.push(DeviceRecord::new(
            &root_hub_id,
            "USB Root Hub (USB 3.0)",
            &root_location,
            Some(&controller_id),
        ));

        HostPaths {
            controller_id,
            root_hub_id,
            root_location,
        }
    }

    /// Add a USB device below `parent` at downstream `port`
    ///
    /// Without a port the device carries no location, like an interface
    /// function of a composite device. Returns the new instance identity.
    pub fn add_device(&mut self, parent: &str, description: &str, port: Option<&str>) -> String {
        let n = self.serial();
        self.add_usb_device(parent, 0x1234, 0x1000 + n as u16, description, port)
    }

    /// Add a USB device with explicit vendor/product identifiers
    pub fn add_usb_device(
        &mut self,
        parent: &str,
        vendor_id: u16,
        product_id: u16,
        description: &str,
        port: Option<&str>,
    ) -> String {
        let n = self.serial();
        let id = usb_instance_id(vendor_id, product_id, &format!("{}&{}", n, parent.len()));
        let location = match port {
            Some(p) => format!("{}#USB({})", self.location_of(parent), p),
            None => String::new(),
        };
        self.devices
            .push(DeviceRecord::new(&id, description, location, Some(parent)));
        id
    }

    /// Add both halves of an Insight Hub below a host's root hub
    ///
    /// The USB2 hub sits on `usb2_port`, its controller on hub port 4 exposes
    /// the serial port `com` (e.g. `COM5`); the USB3 hub sits on `usb3_port`.
    pub fn add_insight_hub(
        &mut self,
        host: &HostPaths,
        usb2_port: &str,
        usb3_port: &str,
        com: &str,
    ) -> InsightHubPaths {
        self.add_insight_hub_below(&host.root_hub_id, usb2_port, &host.root_hub_id, usb3_port, com)
    }

    /// Add an Insight Hub whose halves hang below arbitrary parents
    pub fn add_insight_hub_below(
        &mut self,
        usb2_parent: &str,
        usb2_port: &str,
        usb3_parent: &str,
        usb3_port: &str,
        com: &str,
    ) -> InsightHubPaths {
        let hub2_id = self.add_usb_device(
            usb2_parent,
            HUB2_IDS.0,
            HUB2_IDS.1,
            "Generic USB Hub",
            Some(usb2_port),
        );
        let controller_id = self.add_usb_device(
            &hub2_id,
            CONTROLLER_IDS.0,
            CONTROLLER_IDS.1,
            "USB Composite Device",
            Some("4"),
        );
        self.add_device(
            &controller_id,
            &format!("USB Serial Device ({})", com),
            None,
        );
        let hub3_id = self.add_usb_device(
            usb3_parent,
            HUB3_IDS.0,
            HUB3_IDS.1,
            "Generic SuperSpeed USB Hub",
            Some(usb3_port),
        );

        InsightHubPaths {
            hub2_location: self.location_of(&hub2_id),
            hub3_location: self.location_of(&hub3_id),
            hub2_id,
            hub3_id,
            controller_id,
        }
    }

    /// Register a removable drive backed by `device_id`
    pub fn add_drive(&mut self, letter: &str, device_id: &str) -> &mut Self {
        self.drives.push(DriveInfo {
            letter: letter.to_string(),
            device_id: device_id.to_string(),
        });
        self
    }

    /// Remove a device and everything below it
    pub fn remove_subtree(&mut self, id: &str) -> &mut Self {
        let mut doomed = vec![id.to_string()];
        let mut i = 0;
        while i < doomed.len() {
            let current = doomed[i].clone();
            doomed.extend(
                self.devices
                    .iter()
                    .filter(|d| d.parent_id.as_deref() == Some(current.as_str()))
                    .map(|d| d.instance_id.clone()),
            );
            i += 1;
        }
        self.devices.retain(|d| !doomed.contains(&d.instance_id));
        self
    }

    pub fn build(&self) -> DirectorySnapshot {
        DirectorySnapshot {
            devices: self.devices.clone(),
            drives: self.drives.clone(),
        }
    }
}

/// Run a future with a timeout
///
/// # Example
/// ```
/// use common::test_utils::{with_timeout, DEFAULT_TEST_TIMEOUT};
///
/// # #[tokio::main]
/// # async fn main() {
/// let result = with_timeout(DEFAULT_TEST_TIMEOUT, async { 42 }).await;
/// assert_eq!(result.unwrap(), 42);
/// # }
/// ```
pub async fn with_timeout<T, F>(duration: Duration, future: F) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(duration, future)
        .await
        .map_err(|_| TimeoutError { duration })
}

/// Timeout error for async tests
#[derive(Debug, Clone)]
pub struct TimeoutError {
    pub duration: Duration,
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Operation timed out after {:?}", self.duration)
    }
}

impl std::error::Error for TimeoutError {}
