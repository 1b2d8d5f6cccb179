//! Hub discovery and USB2/USB3 companion pairing

use super::ids::HardwareIds;
use super::memory::CompanionMemory;
use super::recognition::{Hub2Matcher, Hub3Matcher, controller_endpoint, path_head};
use crate::topology::{DeviceNode, DeviceTree};
use std::collections::HashMap;
use tracing::debug;

/// One Insight Hub found in the current topology
#[derive(Debug, Clone)]
pub struct DiscoveredHub {
    /// Subtree rooted at the USB2 half
    pub hub2: DeviceTree,
    /// Subtree rooted at the paired USB3 half, if one was resolved
    pub companion: Option<DeviceTree>,
    /// Serial port name of the controller (may be empty)
    pub endpoint_name: String,
}

impl DiscoveredHub {
    pub fn hub2_node(&self) -> Option<&DeviceNode> {
        self.hub2.root_node()
    }

    /// Port path of the USB2 half, the hub's identity across rebuilds
    pub fn path2(&self) -> &str {
        self.hub2_node().map(|n| n.port_path.as_str()).unwrap_or_default()
    }

    pub fn path3(&self) -> Option<&str> {
        self.companion
            .as_ref()
            .and_then(DeviceTree::root_node)
            .map(|n| n.port_path.as_str())
    }
}

/// Find every Insight Hub in `tree` and pair it with its USB3 half
pub fn discover_hubs(
    tree: &DeviceTree,
    ids: &HardwareIds,
    memory: &CompanionMemory,
) -> Vec<DiscoveredHub> {
    let hubs2 = tree.extract(&Hub2Matcher { ids }, true);
    let hubs3 = tree.extract(&Hub3Matcher { ids: ids.hub3 }, true);
    debug!(
        "Found {} USB2 hub candidates, {} USB3 candidates",
        hubs2.len(),
        hubs3.len()
    );
    pair_companions(hubs2, hubs3, memory, &ids.controller_port)
}

/// Bind each USB2 hub to at most one USB3 candidate
///
/// Remembered pairings are tried first for root-attached hubs. The rest pair
/// by path head, and only where the head is unambiguous on both sides. A
/// hub that cannot be resolved keeps no companion.
pub fn pair_companions(
    hubs2: Vec<DeviceTree>,
    mut candidates: Vec<DeviceTree>,
    memory: &CompanionMemory,
    controller_port: &str,
) -> Vec<DiscoveredHub> {
    let mut hubs: Vec<DiscoveredHub> = Vec::with_capacity(hubs2.len());

    for hub2 in hubs2 {
        let endpoint_name = controller_endpoint(&hub2, controller_port);
        let mut companion = None;

        if let Some(node) = hub2.root_node()
            && node.level == 0
            && let Some(path3) = memory.get(&node.port_path)
            && let Some(pos) = candidates.iter().position(|c| port_path_of(c) == path3)
        {
            debug!("Companion of {} restored from memory: {}", node.port_path, path3);
            companion = Some(candidates.remove(pos));
        }

        hubs.push(DiscoveredHub {
            hub2,
            companion,
            endpoint_name,
        });
    }

    let candidate_heads = head_counts(candidates.iter());
    let root_duplicates = candidates
        .iter()
        .filter(|c| level_of(c) == Some(0) && candidate_heads.get(&head_of(c)).is_some_and(|n| *n > 1))
        .count();
    if root_duplicates > 0 {
        debug!("{} root-level USB3 candidates share a path head", root_duplicates);
    }

    let hub2_heads = head_counts(
        hubs.iter()
            .filter(|h| h.companion.is_none())
            .map(|h| &h.hub2),
    );

    for hub in hubs.iter_mut().filter(|h| h.companion.is_none()) {
        let head = head_of(&hub.hub2);
        if head.is_empty() || hub2_heads.get(&head).copied() != Some(1) {
            continue;
        }
        // Ambiguous heads are excluded from the pool, root-level or not
        if candidate_heads.get(&head).copied() != Some(1) {
            continue;
        }
        if let Some(pos) = candidates.iter().position(|c| head_of(c) == head) {
            hub.companion = Some(candidates.remove(pos));
        }
    }

    hubs
}

fn port_path_of(tree: &DeviceTree) -> &str {
    tree.root_node().map(|n| n.port_path.as_str()).unwrap_or_default()
}

fn level_of(tree: &DeviceTree) -> Option<i32> {
    tree.root_node().map(|n| n.level)
}

fn head_of(tree: &DeviceTree) -> String {
    tree.root_node().map(path_head).unwrap_or_default()
}

fn head_counts<'a>(trees: impl Iterator<Item = &'a DeviceTree>) -> HashMap<String, usize> {
    let mut counts = HashMap::new();
    for tree in trees {
        *counts.entry(head_of(tree)).or_insert(0) += 1;
    }
    counts
}
