//! Insight Hub recognition

use super::ids::{HardwareIds, UsbIds};
use crate::topology::{DeviceNode, DeviceTree, NodeMatcher, NodeRef, hops};

/// Matches the USB2 half: hub identifiers plus the controller on its wired port
pub struct Hub2Matcher<'a> {
    pub ids: &'a HardwareIds,
}

impl NodeMatcher for Hub2Matcher<'_> {
    fn matches(&self, node: NodeRef<'_>) -> bool {
        self.ids.hub2.matches_identity(&node.node().instance_id)
            && node.descendants().any(|d| {
                let n = d.node();
                self.ids.controller.matches_identity(&n.instance_id)
                    && n.port == self.ids.controller_port
            })
    }
}

/// Matches any USB3 half, wherever it is
pub struct Hub3Matcher {
    pub ids: UsbIds,
}

impl NodeMatcher for Hub3Matcher {
    fn matches(&self, node: NodeRef<'_>) -> bool {
        self.ids.matches_identity(&node.node().instance_id)
    }
}

const SERIAL_TOKENS: [&str; 2] = ["(COM", "(tty"];

/// Serial port name in parentheses, e.g. `COM5` from `USB Serial Device (COM5)`
///
/// The token runs to the last closing parenthesis of the description.
pub fn serial_port_token(description: &str) -> Option<&str> {
    let start = SERIAL_TOKENS
        .iter()
        .filter_map(|t| description.find(t))
        .min()?;
    let end = description.rfind(')')?;
    (end > start + 1).then(|| &description[start + 1..end])
}

/// Serial port of a hub's controller, or an empty string when none is exposed
///
/// `hub2` is an extracted single-rooted hub subtree. The first serial token
/// found depth-first below the controller port wins.
pub fn controller_endpoint(hub2: &DeviceTree, controller_port: &str) -> String {
    let Some(root) = hub2.root() else {
        return String::new();
    };

    hub2.children(root)
        .iter()
        .filter(|c| hub2.node(**c).port == controller_port)
        .flat_map(|c| std::iter::once(*c).chain(hub2.descendants(*c)))
        .find_map(|id| serial_port_token(&hub2.node(id).description))
        .map(str::to_string)
        .unwrap_or_default()
}

/// A port path with the hop for the node's own level removed
///
/// Two halves of one product enumerate on different chains whose hops differ
/// only at that position. Paths with fewer than two hops have no head.
pub fn path_head(node: &DeviceNode) -> String {
    let parts = hops(&node.port_path);
    if parts.len() < 2 {
        return String::new();
    }

    let skip = parts.len() as i64 - i64::from(node.level) - 1;
    parts
        .iter()
        .enumerate()
        .filter(|(i, _)| *i as i64 != skip)
        .map(|(_, hop)| *hop)
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::build_topology;
    use common::test_utils::SnapshotBuilder;

    #[test]
    fn test_serial_port_token() {
        assert_eq!(serial_port_token("USB Serial Device (COM5)"), Some("COM5"));
        assert_eq!(serial_port_token("USB Serial Device (ttyACM0)"), Some("ttyACM0"));
        assert_eq!(serial_port_token("Standard COM port"), None);
        assert_eq!(serial_port_token("Broken (COM"), None);
        assert_eq!(serial_port_token("Weird (COM7) (x)"), Some("COM7) (x"));
    }

    #[test]
    fn test_recognizes_hub_with_controller() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        let hub = builder.add_insight_hub(&host, "1", "15", "COM5");
        let tree = build_topology(&builder.build().devices);
        let ids = HardwareIds::default();

        let hubs2 = tree.extract(&Hub2Matcher { ids: &ids }, true);
        assert_eq!(hubs2.len(), 1);
        assert_eq!(hubs2[0].root_node().unwrap().instance_id, hub.hub2_id);
        assert_eq!(controller_endpoint(&hubs2[0], "4"), "COM5");

        let hubs3 = tree.extract(&Hub3Matcher { ids: ids.hub3 }, true);
        assert_eq!(hubs3.len(), 1);
        assert_eq!(hubs3[0].root_node().unwrap().instance_id, hub.hub3_id);
    }

    #[test]
    fn test_controller_on_wrong_port_is_not_a_hub() {
        let mut builder = SnapshotBuilder::new();
        let host = builder.add_host("0014");
        let hub2 = builder.add_usb_device(&host.root_hub_id, 0x045B, 0x0209, "Generic USB Hub", Some("2"));
        builder.add_usb_device(&hub2, 0x303A, 0x1001, "USB Composite Device", Some("3"));
        let tree = build_topology(&builder.build().devices);

        let ids = HardwareIds::default();
        assert!(tree.extract(&Hub2Matcher { ids: &ids }, true).is_empty());
    }

    #[test]
    fn test_path_head_normalizes_depth() {
        let node = |path: &str, level: i32| {
            let records = [common::DeviceRecord::new("x", "USB", "", None)];
            let mut tree = DeviceTree::from_records(&records);
            tree.assign_levels(level);
            let mut n = tree.root_node().unwrap().clone();
            n.port_path = path.to_string();
            n
        };

        // Root-attached halves share controller and root hub
        assert_eq!(path_head(&node("0014-0-1", 0)), "0014-0");
        assert_eq!(path_head(&node("0014-0-15", 0)), "0014-0");

        // Behind a parent hub the parent's port differs between chains
        assert_eq!(path_head(&node("0014-0-3-2", 1)), "0014-0-2");
        assert_eq!(path_head(&node("0014-0-17-2", 1)), "0014-0-2");

        assert_eq!(path_head(&node("0014", 0)), "");
        assert_eq!(path_head(&node("", 0)), "");
    }
}
