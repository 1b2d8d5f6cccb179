//! Port occupancy type definitions
//!
//! These types describe what the agent found behind each downstream port of
//! one Insight Hub, in the reduced form the controller display understands.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of user-facing downstream ports on one hub
pub const PORT_COUNT: usize = 3;

/// Which half of the hub pair a device was enumerated under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HubGeneration {
    /// Found below the USB2 hub
    Usb2,
    /// Found below the USB3 companion hub
    Usb3,
}

impl HubGeneration {
    /// Wire digit used in the `usbType` field
    pub fn as_digit(&self) -> &'static str {
        match self {
            HubGeneration::Usb2 => "2",
            HubGeneration::Usb3 => "3",
        }
    }
}

impl fmt::Display for HubGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_digit())
    }
}

/// Classification of a device seen on a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceCategory {
    /// A downstream hub; absorbs everything beneath it
    Hub,
    /// A serial port (COM / tty)
    Com,
    /// A removable disk with a drive name
    Disk,
    /// A human interface device
    Hid,
    /// Any other leaf device
    Other,
}

impl DeviceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Hub => "Hub",
            DeviceCategory::Com => "COM",
            DeviceCategory::Disk => "DISK",
            DeviceCategory::Hid => "HID",
            DeviceCategory::Other => "Other",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified device on a port
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortDevice {
    /// Display label, e.g. `COM5`, `HID-KB`, `Hub 3`
    pub short_name: String,
    /// Classification rule that produced the label
    pub category: DeviceCategory,
    /// Hub generation the device was found under
    pub generation: HubGeneration,
}

impl PortDevice {
    pub fn new(
        short_name: impl Into<String>,
        category: DeviceCategory,
        generation: HubGeneration,
    ) -> Self {
        Self {
            short_name: short_name.into(),
            category,
            generation,
        }
    }
}

/// Per-port device lists for one hub
///
/// Port numbers are 1-based; entries keep the depth-first order in which the
/// classifier found them, USB2 side first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortOccupancy {
    ports: [Vec<PortDevice>; PORT_COUNT],
}

impl PortOccupancy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a device to a 1-based port. Returns false for ports outside `1..=3`.
    pub fn push(&mut self, port: usize, device: PortDevice) -> bool {
        match port.checked_sub(1).and_then(|i| self.ports.get_mut(i)) {
            Some(list) => {
                list.push(device);
                true
            }
            None => false,
        }
    }

    /// Devices on a 1-based port (empty for out-of-range ports)
    pub fn port(&self, port: usize) -> &[PortDevice] {
        port.checked_sub(1)
            .and_then(|i| self.ports.get(i))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterate `(port_number, devices)` for ports 1..=3
    pub fn iter(&self) -> impl Iterator<Item = (usize, &[PortDevice])> {
        self.ports
            .iter()
            .enumerate()
            .map(|(i, list)| (i + 1, list.as_slice()))
    }

    pub fn total(&self) -> usize {
        self.ports.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    pub fn clear(&mut self) {
        self.ports.iter_mut().for_each(Vec::clear);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_rejects_out_of_range_ports() {
        let mut occupancy = PortOccupancy::new();
        let dev = PortDevice::new("COM3", DeviceCategory::Com, HubGeneration::Usb2);

        assert!(occupancy.push(1, dev.clone()));
        assert!(occupancy.push(3, dev.clone()));
        assert!(!occupancy.push(0, dev.clone()));
        assert!(!occupancy.push(4, dev));

        assert_eq!(occupancy.total(), 2);
        assert_eq!(occupancy.port(1).len(), 1);
        assert!(occupancy.port(2).is_empty());
        assert!(occupancy.port(7).is_empty());
    }

    #[test]
    fn test_clear() {
        let mut occupancy = PortOccupancy::new();
        occupancy.push(2, PortDevice::new("sdb", DeviceCategory::Disk, HubGeneration::Usb3));
        assert!(!occupancy.is_empty());
        occupancy.clear();
        assert!(occupancy.is_empty());
    }

    #[test]
    fn test_wire_labels() {
        assert_eq!(HubGeneration::Usb2.to_string(), "2");
        assert_eq!(HubGeneration::Usb3.as_digit(), "3");
        assert_eq!(DeviceCategory::Com.as_str(), "COM");
        assert_eq!(DeviceCategory::Disk.to_string(), "DISK");
    }
}
