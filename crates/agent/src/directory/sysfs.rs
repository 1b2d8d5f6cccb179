//! Linux sysfs device directory
//!
//! Walks `bus/usb/devices` below the sysfs root and synthesises records in
//! the same shape the rest of the agent expects:
//!
//! | sysfs | identity | location |
//! |---|---|---|
//! | host controller (parent of `usbN`) | `PCI\0000:00:14.0` | `PCI(0000:00:14.0)` |
//! | root hub `usbN` | `USB\ROOT_HUB30\usb2` | `PCI(..)#USBROOT(0)` |
//! | device `1-1.4` | `USB\VID_xxxx&PID_yyyy\1-1.4` | parent + `#USB(4)` |
//! | HID interface `1-1.4:1.0` | `HID\1-1.4:1.0` | none |
//! | tty below an interface | `TTY\ttyACM0` | none |
//! | block disk below an interface | `BLOCK\sdb` | none |
//!
//! Both root hubs of one controller report `USBROOT(0)`, so the USB2 and USB3
//! halves of a product share every hop except their own port.

use super::DeviceDirectory;
use common::{DeviceRecord, DriveInfo, Error, Result, usb_instance_id};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const HUB_CLASS: &str = "09";
const HID_CLASS: &str = "03";
const MAX_INTERFACE_DEPTH: usize = 6;

#[derive(Debug, Clone)]
pub struct SysfsDirectory {
    root: PathBuf,
}

impl SysfsDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn bus_dir(&self) -> PathBuf {
        self.root.join("bus/usb/devices")
    }
}

impl Default for SysfsDirectory {
    fn default() -> Self {
        Self::new("/sys")
    }
}

impl DeviceDirectory for SysfsDirectory {
    fn devices(&self) -> Result<Vec<DeviceRecord>> {
        let bus_dir = self.bus_dir();
        let mut names: Vec<String> = fs::read_dir(&bus_dir)
            .map_err(|e| Error::Directory(format!("{}: {}", bus_dir.display(), e)))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| !name.contains(':'))
            .collect();
        names.sort_by_key(|name| sort_key(name));

        let mut scan = Scan::default();
        for name in &names {
            let dir = match fs::canonicalize(bus_dir.join(name)) {
                Ok(dir) => dir,
                Err(e) => {
                    warn!("Skipping {}: {}", name, e);
                    continue;
                }
            };

            if let Some(bus) = name.strip_prefix("usb") {
                scan.add_root_hub(name, bus, &dir);
            } else {
                scan.add_device(name, &dir);
            }
        }

        debug!("sysfs scan produced {} records", scan.records.len());
        Ok(scan.records)
    }

    fn removable_drives(&self) -> Result<Vec<DriveInfo>> {
        let block_dir = self.root.join("block");
        let entries = fs::read_dir(&block_dir)
            .map_err(|e| Error::Directory(format!("{}: {}", block_dir.display(), e)))?;

        let mut drives: Vec<DriveInfo> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                fs::canonicalize(entry.path())
                    .map(|p| p.to_string_lossy().contains("/usb"))
                    .unwrap_or(false)
            })
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                DriveInfo {
                    device_id: block_id(&name),
                    letter: name,
                }
            })
            .collect();
        drives.sort_by(|a, b| a.letter.cmp(&b.letter));
        Ok(drives)
    }
}

#[derive(Default)]
struct Scan {
    records: Vec<DeviceRecord>,
    hosts: BTreeSet<String>,
    /// sysfs name -> (identity, location)
    placed: HashMap<String, (String, String)>,
}

impl Scan {
    fn add_root_hub(&mut self, name: &str, bus: &str, dir: &Path) {
        let Some(host_dir) = dir.parent() else {
            return;
        };
        let host = file_name(host_dir);
        let host_id = format!(r"PCI\{}", host);
        let host_location = format!("PCI({})", host);

        if self.hosts.insert(host.clone()) {
            self.records.push(DeviceRecord::new(
                &host_id,
                host_description(host_dir),
                &host_location,
                None,
            ));
        }

        let version = read_attr(dir, "version").unwrap_or_default();
        let generation = if version.starts_with('3') { "30" } else { "20" };
        let id = format!(r"USB\ROOT_HUB{}\{}", generation, name);
        let location = format!("{}#USBROOT(0)", host_location);
        let description = format!("USB Root Hub (USB {})", version);

        debug!("Root hub {} (bus {}) on {}", name, bus, host);
        self.records
            .push(DeviceRecord::new(&id, description, &location, Some(&host_id)));
        self.placed.insert(name.to_string(), (id, location));
    }

    fn add_device(&mut self, name: &str, dir: &Path) {
        let Some((parent_name, port)) = split_device_name(name) else {
            debug!("Ignoring sysfs entry {}", name);
            return;
        };

        let vendor_id = read_hex(dir, "idVendor").unwrap_or(0);
        let product_id = read_hex(dir, "idProduct").unwrap_or(0);
        let id = usb_instance_id(vendor_id, product_id, name);
        let class = read_attr(dir, "bDeviceClass").unwrap_or_default();

        let (parent_id, location) = match self.placed.get(&parent_name) {
            Some((pid, ploc)) => (Some(pid.clone()), format!("{}#USB({})", ploc, port)),
            None => {
                warn!("Parent {} of {} not found", parent_name, name);
                (None, String::new())
            }
        };

        let description = if class == HUB_CLASS {
            hub_description(dir)
        } else {
            read_attr(dir, "product").unwrap_or_else(|| "USB Device".to_string())
        };

        self.records.push(DeviceRecord::new(
            &id,
            description,
            &location,
            parent_id.as_deref(),
        ));
        self.placed.insert(name.to_string(), (id.clone(), location));

        if class != HUB_CLASS {
            self.add_interfaces(name, &id, dir);
        }
    }

    fn add_interfaces(&mut self, name: &str, device_id: &str, dir: &Path) {
        let prefix = format!("{}:", name);
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut interfaces: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .map(|e| e.path())
            .collect();
        interfaces.sort();

        for iface in interfaces {
            let iface_name = file_name(&iface);

            if read_attr(&iface, "bInterfaceClass").as_deref() == Some(HID_CLASS) {
                let description = match read_attr(&iface, "bInterfaceProtocol").as_deref() {
                    Some("01") => "HID Keyboard Device",
                    Some("02") => "HID-compliant mouse",
                    _ => "HID-compliant device",
                };
                self.records.push(DeviceRecord::new(
                    format!(r"HID\{}", iface_name),
                    description,
                    "",
                    Some(device_id),
                ));
            }

            let mut found = Found::default();
            find_functions(&iface, MAX_INTERFACE_DEPTH, &mut found);

            for tty in found.ttys {
                self.records.push(DeviceRecord::new(
                    format!(r"TTY\{}", tty),
                    format!("USB Serial Device ({})", tty),
                    "",
                    Some(device_id),
                ));
            }
            for (block, scsi_dir) in found.blocks {
                self.records.push(DeviceRecord::new(
                    block_id(&block),
                    disk_description(&scsi_dir),
                    "",
                    Some(device_id),
                ));
            }
        }
    }
}

#[derive(Default)]
struct Found {
    ttys: BTreeSet<String>,
    /// block name and the SCSI device directory holding vendor/model
    blocks: Vec<(String, PathBuf)>,
}

/// Look for tty and block children below an interface without following links
fn find_functions(dir: &Path, depth: usize, found: &mut Found) {
    if depth == 0 {
        return;
    }
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.filter_map(|e| e.ok()) {
        let Ok(kind) = entry.file_type() else {
            continue;
        };
        if !kind.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();

        if name.starts_with("ttyACM") || name.starts_with("ttyUSB") {
            found.ttys.insert(name);
        } else if name == "block" {
            if let Ok(blocks) = fs::read_dir(entry.path()) {
                for block in blocks.filter_map(|e| e.ok()) {
                    found
                        .blocks
                        .push((block.file_name().to_string_lossy().into_owned(), dir.to_path_buf()));
                }
            }
        } else {
            find_functions(&entry.path(), depth - 1, found);
        }
    }
}

/// `1-1.4` -> (`1-1`, `4`); `1-2` -> (`usb1`, `2`)
fn split_device_name(name: &str) -> Option<(String, &str)> {
    if let Some((parent, port)) = name.rsplit_once('.') {
        return Some((parent.to_string(), port));
    }
    let (bus, port) = name.split_once('-')?;
    Some((format!("usb{}", bus), port))
}

/// Root hubs first, then devices by numeric bus/port chain
fn sort_key(name: &str) -> (bool, Vec<u32>) {
    let numbers = name
        .trim_start_matches("usb")
        .split(['-', '.'])
        .filter_map(|part| part.parse().ok())
        .collect();
    (!name.starts_with("usb"), numbers)
}

fn block_id(name: &str) -> String {
    format!(r"BLOCK\{}", name)
}

fn host_description(host_dir: &Path) -> String {
    let driver = fs::read_link(host_dir.join("driver"))
        .ok()
        .map(|p| file_name(&p))
        .unwrap_or_default();
    match driver.as_str() {
        "xhci_hcd" => "USB xHCI Compliant Host Controller".to_string(),
        "ehci-pci" => "USB EHCI Host Controller".to_string(),
        "" => "USB Host Controller".to_string(),
        other => format!("USB Host Controller ({})", other),
    }
}

fn hub_description(dir: &Path) -> String {
    let speed: u32 = read_attr(dir, "speed")
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    if speed >= 5000 {
        "Generic SuperSpeed USB Hub".to_string()
    } else {
        "Generic USB Hub".to_string()
    }
}

fn disk_description(scsi_dir: &Path) -> String {
    let vendor = read_attr(scsi_dir, "vendor").unwrap_or_default();
    let model = read_attr(scsi_dir, "model").unwrap_or_default();
    let label = format!("{} {}", vendor, model);
    let label = label.trim();
    if label.is_empty() {
        "USB Disk Device".to_string()
    } else {
        format!("{} USB Device", label)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_attr(dir: &Path, attr: &str) -> Option<String> {
    let value = fs::read_to_string(dir.join(attr)).ok()?;
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn read_hex(dir: &Path, attr: &str) -> Option<u16> {
    u16::from_str_radix(&read_attr(dir, attr)?, 16).ok()
}
