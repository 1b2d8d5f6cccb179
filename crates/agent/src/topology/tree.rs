//! Arena-backed device tree
//!
//! Nodes live in a flat vector and refer to each other by [`NodeId`]. Children
//! are owned index lists; the parent index is only a back-reference for
//! lookups. A tree is rebuilt from scratch on every topology cycle and the
//! subtrees handed to hub tracking are independent copies.

use super::location::{parse_port_path, port_of};
use common::DeviceRecord;
use std::collections::HashMap;
use std::fmt::Write as _;
use tracing::warn;

/// Index of a node inside its [`DeviceTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// One device in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceNode {
    pub instance_id: String,
    pub description: String,
    pub location_path: String,
    /// Hyphen-joined hop list from the host root (possibly inherited)
    pub port_path: String,
    /// Final hop of the port path (possibly inherited)
    pub port: String,
    /// Identity of the nearest node that exposes its own position
    pub last_locatable_id: String,
    /// Depth relative to the first hub below the root hub
    pub level: i32,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl DeviceNode {
    fn from_record(record: &DeviceRecord) -> Self {
        let port_path = parse_port_path(&record.location_path);
        let port = port_of(&port_path).to_string();
        let last_locatable_id = if port_path.is_empty() {
            String::new()
        } else {
            record.instance_id.clone()
        };

        Self {
            instance_id: record.instance_id.clone(),
            description: record.description.clone(),
            location_path: record.location_path.clone(),
            port_path,
            port,
            last_locatable_id,
            level: 0,
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A forest of devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceTree {
    nodes: Vec<DeviceNode>,
    roots: Vec<NodeId>,
}

impl DeviceTree {
    /// Link flat records into a forest and propagate positions
    ///
    /// Records whose parent is unknown (or missing) become roots. Levels are
    /// left at zero; see [`DeviceTree::assign_levels`].
    pub fn from_records(records: &[DeviceRecord]) -> Self {
        let mut tree = DeviceTree::default();
        let mut index: HashMap<&str, NodeId> = HashMap::with_capacity(records.len());
        let mut kept: Vec<&DeviceRecord> = Vec::with_capacity(records.len());

        for record in records {
            if index.contains_key(record.instance_id.as_str()) {
                warn!("Duplicate device instance {}, ignoring", record.instance_id);
                continue;
            }
            let id = NodeId(tree.nodes.len());
            index.insert(record.instance_id.as_str(), id);
            tree.nodes.push(DeviceNode::from_record(record));
            kept.push(record);
        }

        for (i, record) in kept.iter().enumerate() {
            let id = NodeId(i);
            let parent = record
                .parent_id
                .as_deref()
                .and_then(|p| index.get(p).copied())
                .filter(|p| *p != id);

            match parent {
                Some(p) => {
                    tree.nodes[i].parent = Some(p);
                    tree.nodes[p.0].children.push(id);
                }
                None => tree.roots.push(id),
            }
        }

        tree.break_cycles();
        tree.propagate_positions();
        tree
    }

    /// Promote nodes stuck in parent cycles to roots
    fn break_cycles(&mut self) {
        loop {
            let mut reachable = vec![false; self.nodes.len()];
            for id in self.depth_first() {
                reachable[id.0] = true;
            }
            let Some(stuck) = reachable.iter().position(|r| !r) else {
                return;
            };

            let id = NodeId(stuck);
            warn!(
                "Parent cycle at {}, treating it as a root",
                self.nodes[stuck].instance_id
            );
            if let Some(p) = self.nodes[stuck].parent.take() {
                self.nodes[p.0].children.retain(|c| *c != id);
            }
            self.roots.push(id);
        }
    }

    /// Children without a port path of their own adopt the nearest positioned ancestor's
    fn propagate_positions(&mut self) {
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let (port, port_path, last) = {
                let n = &self.nodes[id.0];
                (n.port.clone(), n.port_path.clone(), n.last_locatable_id.clone())
            };
            for &child in self.nodes[id.0].children.clone().iter().rev() {
                let c = &mut self.nodes[child.0];
                if c.port_path.is_empty() {
                    c.port = port.clone();
                    c.port_path = port_path.clone();
                    c.last_locatable_id = last.clone();
                }
                stack.push(child);
            }
        }
    }

    /// Set levels depth-first, each root starting at `base`
    pub fn assign_levels(&mut self, base: i32) {
        let mut stack: Vec<(NodeId, i32)> = self.roots.iter().map(|r| (*r, base)).collect();
        while let Some((id, level)) = stack.pop() {
            self.nodes[id.0].level = level;
            for &child in &self.nodes[id.0].children {
                stack.push((child, level + 1));
            }
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// The first root, for single-rooted subtrees
    pub fn root(&self) -> Option<NodeId> {
        self.roots.first().copied()
    }

    /// The first root's node
    pub fn root_node(&self) -> Option<&DeviceNode> {
        self.root().map(|id| self.node(id))
    }

    pub fn node(&self, id: NodeId) -> &DeviceNode {
        &self.nodes[id.0]
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Pre-order traversal across all roots
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// Pre-order traversal below `id`, excluding `id` itself
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut stack: Vec<NodeId> = self.nodes[id.0].children.iter().rev().copied().collect();
        while let Some(current) = stack.pop() {
            order.push(current);
            stack.extend(self.nodes[current.0].children.iter().rev().copied());
        }
        order
    }

    /// Deep copy of the subtree rooted at `id` as a new single-rooted tree
    pub fn clone_subtree(&self, id: NodeId) -> DeviceTree {
        let mut copy = DeviceTree::default();
        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(id, None)];

        while let Some((source, parent)) = stack.pop() {
            let new_id = NodeId(copy.nodes.len());
            let mut node = self.nodes[source.0].clone();
            node.parent = parent;
            node.children = Vec::with_capacity(node.children.len());
            copy.nodes.push(node);

            match parent {
                Some(p) => copy.nodes[p.0].children.push(new_id),
                None => copy.roots.push(new_id),
            }
            for &child in self.nodes[source.0].children.iter().rev() {
                stack.push((child, Some(new_id)));
            }
        }

        copy
    }

    /// Concatenate independent trees into one forest, preserving root order
    pub fn from_subtrees(subtrees: Vec<DeviceTree>) -> DeviceTree {
        let mut forest = DeviceTree::default();
        for subtree in subtrees {
            let offset = forest.nodes.len();
            let shift = |id: NodeId| NodeId(id.0 + offset);
            forest.roots.extend(subtree.roots.iter().copied().map(shift));
            forest.nodes.extend(subtree.nodes.into_iter().map(|mut node| {
                node.parent = node.parent.map(shift);
                node.children = node.children.into_iter().map(shift).collect();
                node
            }));
        }
        forest
    }

    /// First node in pre-order satisfying `pred`
    pub fn find<F>(&self, mut pred: F) -> Option<NodeId>
    where
        F: FnMut(&DeviceNode) -> bool,
    {
        self.depth_first().into_iter().find(|id| pred(self.node(*id)))
    }

    /// Box-drawing rendering used for diagnostics
    pub fn render(&self) -> String {
        let mut out = String::new();
        for &root in &self.roots {
            self.render_node(root, "", true, &mut out);
        }
        out
    }

    fn render_node(&self, id: NodeId, indent: &str, is_last: bool, out: &mut String) {
        let node = self.node(id);
        let _ = writeln!(
            out,
            "{}{}{} [{}][{}][{}][{}]",
            indent,
            if is_last { "└─" } else { "├─" },
            node.description,
            node.instance_id,
            node.level,
            node.port_path,
            node.port
        );
        let child_indent = format!("{}{}", indent, if is_last { "  " } else { "│ " });
        let count = node.children.len();
        for (i, &child) in node.children.iter().enumerate() {
            self.render_node(child, &child_indent, i + 1 == count, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(id: &str, location: &str, parent: Option<&str>) -> DeviceRecord {
        DeviceRecord::new(id, format!("USB device {}", id), location, parent)
    }

    #[test]
    fn test_linking_and_roots() {
        let tree = DeviceTree::from_records(&[
            rec("host", "PCIROOT(0)#PCI(0014)", None),
            rec("root", "PCIROOT(0)#PCI(0014)#USBROOT(0)", Some("host")),
            rec("dev", "PCIROOT(0)#PCI(0014)#USBROOT(0)#USB(2)", Some("root")),
            rec("orphan", "", Some("missing")),
        ]);

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().len(), 2);
        let host = tree.roots()[0];
        assert_eq!(tree.node(host).instance_id, "host");
        assert_eq!(tree.node(host).port, "");

        let dev = tree.find(|n| n.instance_id == "dev").unwrap();
        assert_eq!(tree.node(dev).port_path, "0014-0-2");
        assert_eq!(tree.node(dev).port, "2");
        assert_eq!(tree.node(dev).last_locatable_id, "dev");
        assert_eq!(tree.node(tree.parent(dev).unwrap()).instance_id, "root");
    }

    #[test]
    fn test_positions_are_inherited() {
        let tree = DeviceTree::from_records(&[
            rec("root", "PCI(0014)#USBROOT(0)", None),
            rec("composite", "PCI(0014)#USBROOT(0)#USB(3)", Some("root")),
            rec("function", "", Some("composite")),
            rec("grandchild", "", Some("function")),
        ]);

        let grandchild = tree.find(|n| n.instance_id == "grandchild").unwrap();
        let node = tree.node(grandchild);
        assert_eq!(node.port, "3");
        assert_eq!(node.port_path, "0014-0-3");
        assert_eq!(node.last_locatable_id, "composite");
    }

    #[test]
    fn test_single_hop_node_keeps_its_own_path() {
        let tree = DeviceTree::from_records(&[
            rec("root", "PCI(0014)#USBROOT(0)", None),
            rec("bridge", "PCI(0015)", Some("root")),
            rec("function", "", Some("bridge")),
        ]);

        let bridge = tree.node(tree.find(|n| n.instance_id == "bridge").unwrap());
        assert_eq!(bridge.port_path, "0015");
        assert_eq!(bridge.port, "");
        assert_eq!(bridge.last_locatable_id, "bridge");

        let function = tree.node(tree.find(|n| n.instance_id == "function").unwrap());
        assert_eq!(function.port_path, "0015");
        assert_eq!(function.last_locatable_id, "bridge");
    }

    #[test]
    fn test_assign_levels_from_base() {
        let mut tree = DeviceTree::from_records(&[
            rec("host", "PCI(0014)", None),
            rec("root", "PCI(0014)#USBROOT(0)", Some("host")),
            rec("hub", "PCI(0014)#USBROOT(0)#USB(1)", Some("root")),
            rec("dev", "PCI(0014)#USBROOT(0)#USB(1)#USB(2)", Some("hub")),
        ]);
        tree.assign_levels(-2);

        let levels: Vec<i32> = tree.depth_first().iter().map(|id| tree.node(*id).level).collect();
        assert_eq!(levels, vec![-2, -1, 0, 1]);
    }

    #[test]
    fn test_duplicates_and_cycles_do_not_panic() {
        let tree = DeviceTree::from_records(&[
            rec("a", "", Some("b")),
            rec("b", "", Some("a")),
            rec("a", "", None),
            rec("self", "", Some("self")),
        ]);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.depth_first().len(), 3);
    }

    #[test]
    fn test_clone_subtree_is_independent() {
        let tree = DeviceTree::from_records(&[
            rec("root", "PCI(1)#USBROOT(0)", None),
            rec("hub", "PCI(1)#USBROOT(0)#USB(1)", Some("root")),
            rec("a", "PCI(1)#USBROOT(0)#USB(1)#USB(1)", Some("hub")),
            rec("b", "PCI(1)#USBROOT(0)#USB(1)#USB(2)", Some("hub")),
        ]);
        let hub = tree.find(|n| n.instance_id == "hub").unwrap();

        let mut copy = tree.clone_subtree(hub);
        assert_eq!(copy.len(), 3);
        assert_eq!(copy.root_node().unwrap().instance_id, "hub");
        assert_eq!(copy.root_node().unwrap().parent(), None);

        let ids: Vec<&str> = copy
            .depth_first()
            .iter()
            .map(|id| copy.node(*id).instance_id.as_str())
            .collect();
        assert_eq!(ids, vec!["hub", "a", "b"]);

        copy.assign_levels(7);
        assert_eq!(tree.node(hub).level, 0);
    }

    #[test]
    fn test_from_subtrees_offsets_indices() {
        let tree = DeviceTree::from_records(&[
            rec("r1", "PCI(1)", None),
            rec("c1", "PCI(1)#USB(1)", Some("r1")),
            rec("r2", "PCI(2)", None),
            rec("c2", "PCI(2)#USB(1)", Some("r2")),
        ]);
        let parts = tree.roots().iter().map(|r| tree.clone_subtree(*r)).collect();
        let forest = DeviceTree::from_subtrees(parts);

        assert_eq!(forest.roots().len(), 2);
        let second = forest.roots()[1];
        let child = forest.children(second)[0];
        assert_eq!(forest.node(child).instance_id, "c2");
        assert_eq!(forest.parent(child), Some(second));
    }

    #[test]
    fn test_render() {
        let tree = DeviceTree::from_records(&[
            rec("root", "PCI(1)#USBROOT(0)", None),
            rec("a", "PCI(1)#USBROOT(0)#USB(1)", Some("root")),
            rec("b", "PCI(1)#USBROOT(0)#USB(2)", Some("root")),
        ]);
        let text = tree.render();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "└─USB device root [root][0][1-0][0]");
        assert_eq!(lines[1], "  ├─USB device a [a][0][1-0-1][1]");
        assert_eq!(lines[2], "  └─USB device b [b][0][1-0-2][2]");
    }
}
