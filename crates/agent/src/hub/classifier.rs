//! Per-port device classification
//!
//! Walks the subtree under each downstream port of a hub (USB2 half first,
//! then the USB3 companion) and turns recognisable devices into short labels.
//! Every device matching a rule gets an entry; only a hub stops the descent,
//! standing in for everything behind it.

use super::recognition::serial_port_token;
use crate::topology::{DeviceTree, NodeId};
use common::DriveInfo;
use protocol::{DeviceCategory, HubGeneration, PortDevice, PortOccupancy};
use tracing::trace;

/// Classify everything plugged into a hub's ports
pub fn classify_ports(
    hub2: &DeviceTree,
    companion: Option<&DeviceTree>,
    drives: &[DriveInfo],
) -> PortOccupancy {
    let mut occupancy = PortOccupancy::new();
    classify_hub(hub2, HubGeneration::Usb2, drives, &mut occupancy);
    if let Some(hub3) = companion {
        classify_hub(hub3, HubGeneration::Usb3, drives, &mut occupancy);
    }
    occupancy
}

fn classify_hub(
    tree: &DeviceTree,
    generation: HubGeneration,
    drives: &[DriveInfo],
    occupancy: &mut PortOccupancy,
) {
    let Some(root) = tree.root() else {
        return;
    };
    let hub_path = &tree.node(root).port_path;

    for &child in tree.children(root) {
        let node = tree.node(child);
        // Inherited the hub's own position, so it sits on no downstream port
        if node.port_path == *hub_path {
            continue;
        }
        match node.port.parse::<usize>() {
            Ok(port @ 1..=protocol::PORT_COUNT) => {
                classify_node(tree, child, port, generation, drives, occupancy)
            }
            _ => trace!("Skipping {} on port '{}'", node.instance_id, node.port),
        }
    }
}

fn classify_node(
    tree: &DeviceTree,
    id: NodeId,
    port: usize,
    generation: HubGeneration,
    drives: &[DriveInfo],
    occupancy: &mut PortOccupancy,
) {
    if let Some((name, category)) = label(tree, id, generation, drives) {
        occupancy.push(port, PortDevice::new(name, category, generation));
        if category == DeviceCategory::Hub {
            return;
        }
    }

    for &child in tree.children(id) {
        classify_node(tree, child, port, generation, drives, occupancy);
    }
}

/// Short label and category for one node, if any rule applies
pub fn label(
    tree: &DeviceTree,
    id: NodeId,
    generation: HubGeneration,
    drives: &[DriveInfo],
) -> Option<(String, DeviceCategory)> {
    let node = tree.node(id);
    let desc = node.description.as_str();
    let lower = desc.to_lowercase();

    if lower.contains("hub") {
        return Some((format!("Hub {}", generation), DeviceCategory::Hub));
    }

    if desc.contains("COM") || desc.contains("(tty") {
        return serial_port_token(desc).map(|t| (t.to_string(), DeviceCategory::Com));
    }

    if let Some(drive) = drives.iter().find(|d| d.device_id == node.instance_id) {
        return Some((drive.letter.clone(), DeviceCategory::Disk));
    }

    if lower.contains("hid") {
        let name = if lower.contains("mouse") {
            "HID-MOU"
        } else if lower.contains("keyboard") {
            "HID-KB"
        } else {
            "HID-x"
        };
        return Some((name.to_string(), DeviceCategory::Hid));
    }

    if node.is_leaf() {
        let name = desc.replace("Generic", "").trim().to_string();
        if !name.is_empty() {
            return Some((name, DeviceCategory::Other));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::{CompanionMemory, HardwareIds, discover_hubs};
    use crate::topology::build_topology;
    use common::test_utils::SnapshotBuilder;

    fn names(occupancy: &PortOccupancy, port: usize) -> Vec<String> {
        occupancy
            .port(port)
            .iter()
            .map(|d| format!("{}/{}", d.short_name, d.generation))
            .collect()
    }

    fn occupancy_of(builder: &SnapshotBuilder) -> PortOccupancy {
        let snapshot = builder.build();
        let tree = build_topology(&snapshot.devices);
        let hubs = discover_hubs(&tree, &HardwareIds::default(), &CompanionMemory::new());
        assert_eq!(hubs.len(), 1);
        classify_ports(&hubs[0].hub2, hubs[0].companion.as_ref(), &snapshot.drives)
    }

    #[test]
    fn test_empty_hub() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        builder.add_insight_hub(&host, "1", "15", "COM5");

        // The controller on port 4 is not user-facing
        assert!(occupancy_of(&builder).is_empty());
    }

    #[test]
    fn test_rules_in_priority_order() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        let hub = builder.add_insight_hub(&host, "1", "15", "COM5");

        let composite = builder.add_device(&hub.hub2_id, "USB Composite Device", Some("1"));
        builder.add_device(&composite, "HID Keyboard Device", None);
        builder.add_device(&composite, "HID-compliant mouse", None);
        builder.add_device(&composite, "USB Serial Device (COM9)", None);

        let disk = builder.add_device(&hub.hub3_id, "USB Mass Storage Device", Some("2"));
        let block = builder.add_device(&disk, "Samsung Flash USB Device", None);
        builder.add_drive("E:", &block);

        builder.add_device(&hub.hub2_id, "Generic Sensor", Some("3"));

        let occupancy = occupancy_of(&builder);
        assert_eq!(names(&occupancy, 1), vec!["HID-KB/2", "HID-MOU/2", "COM9/2"]);
        assert_eq!(names(&occupancy, 2), vec!["E:/3"]);
        assert_eq!(names(&occupancy, 3), vec!["Sensor/2"]);
    }

    #[test]
    fn test_sub_hub_absorbs_its_subtree() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        let hub = builder.add_insight_hub(&host, "1", "15", "COM5");

        let inner = builder.add_device(&hub.hub2_id, "Generic USB Hub", Some("2"));
        builder.add_device(&inner, "HID Keyboard Device", Some("1"));
        builder.add_device(&hub.hub2_id, "Webcam", Some("2"));
        let inner3 = builder.add_device(&hub.hub3_id, "Generic SuperSpeed USB Hub", Some("2"));
        builder.add_device(&inner3, "Drive", Some("1"));

        let occupancy = occupancy_of(&builder);
        assert_eq!(names(&occupancy, 2), vec!["Hub 2/2", "Webcam/2", "Hub 3/3"]);
    }

    #[test]
    fn test_non_leaf_without_rule_contributes_nothing() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        let hub = builder.add_insight_hub(&host, "1", "15", "COM5");

        let composite = builder.add_device(&hub.hub2_id, "USB Composite Device", Some("1"));
        builder.add_device(&composite, "USB Audio", None);

        let occupancy = occupancy_of(&builder);
        assert_eq!(names(&occupancy, 1), vec!["USB Audio/2"]);
    }

    #[test]
    fn test_com_without_token_falls_through_to_children() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        let hub = builder.add_insight_hub(&host, "1", "15", "COM5");

        let adapter = builder.add_device(&hub.hub2_id, "COM adapter", Some("3"));
        builder.add_device(&adapter, "USB Serial Device (COM12)", None);

        let occupancy = occupancy_of(&builder);
        assert_eq!(names(&occupancy, 3), vec!["COM12/2"]);
    }
}
