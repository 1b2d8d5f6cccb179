//! Vendor/product identifier pairs

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A USB vendor/product pair, written `VVVV:PPPP` in hex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbIds {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbIds {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }

    /// Whether an instance identity carries both `VID_xxxx` and `PID_yyyy`
    ///
    /// Identity strings report hex in upper case; the comparison ignores case
    /// anyway so hand-written snapshots still match.
    pub fn matches_identity(&self, instance_id: &str) -> bool {
        let id = instance_id.to_ascii_uppercase();
        id.contains(&format!("VID_{:04X}", self.vendor_id))
            && id.contains(&format!("PID_{:04X}", self.product_id))
    }
}

impl fmt::Display for UsbIds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.vendor_id, self.product_id)
    }
}

impl FromStr for UsbIds {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (vid, pid) = s
            .split_once(':')
            .ok_or_else(|| format!("expected VID:PID, got '{}'", s))?;
        let parse = |part: &str| {
            if part.len() != 4 {
                return Err(format!("'{}' is not a 4-digit hex identifier", part));
            }
            u16::from_str_radix(part, 16)
                .map_err(|_| format!("'{}' is not a 4-digit hex identifier", part))
        };
        Ok(Self::new(parse(vid.trim())?, parse(pid.trim())?))
    }
}

impl Serialize for UsbIds {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UsbIds {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identifiers and wiring of the Insight Hub product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareIds {
    /// USB2 hub half
    pub hub2: UsbIds,
    /// USB3 hub half
    pub hub3: UsbIds,
    /// Onboard display controller
    pub controller: UsbIds,
    /// USB2 hub port the controller is wired to
    pub controller_port: String,
}

impl Default for HardwareIds {
    fn default() -> Self {
        Self {
            hub2: UsbIds::new(0x045B, 0x0209),
            hub3: UsbIds::new(0x045B, 0x0210),
            controller: UsbIds::new(0x303A, 0x1001),
            controller_port: "4".to_string(),
        }
    }
}
