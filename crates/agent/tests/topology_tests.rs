//! Property tests for the device forest
//!
//! Random device trees below one host controller check that:
//! - levels grow by one per generation from the root level
//! - port paths extend the parent's path by exactly one hop, or are inherited
//! - non-descending extraction yields exactly the top-most matches
//! - cloned subtrees reproduce the original nodes in pre-order

use agent::topology::{DeviceTree, NodeId, NodeRef, ROOT_LEVEL, build_topology};
use common::DeviceRecord;
use proptest::prelude::*;
use proptest::sample::Index;

/// (parent pick, own port, description mentions USB)
type NodeShape = (Index, Option<u8>, bool);

fn records(shapes: &[NodeShape]) -> Vec<DeviceRecord> {
    let mut records = vec![DeviceRecord::new(
        r"PCI\HOST",
        "USB xHCI Compliant Host Controller",
        "PCIROOT(0)#PCI(0014)",
        None,
    )];
    for (i, (parent, port, usb)) in shapes.iter().enumerate() {
        let parent = &records[parent.index(records.len())];
        let parent_id = parent.instance_id.clone();
        let location = match port {
            Some(p) if !parent.location_path.is_empty() => {
                format!("{}#USB({})", parent.location_path, p)
            }
            _ => String::new(),
        };
        let description = if *usb {
            format!("USB Device {}", i)
        } else {
            format!("Device {}", i)
        };
        records.push(DeviceRecord::new(
            format!(r"DEV\{}", i),
            description,
            location,
            Some(&parent_id),
        ));
    }
    records
}

fn node_shapes() -> impl Strategy<Value = Vec<NodeShape>> {
    prop::collection::vec((any::<Index>(), prop::option::of(1u8..10), any::<bool>()), 0..40)
}

fn is_usb(node: NodeRef<'_>) -> bool {
    node.node().description.to_lowercase().contains("usb")
}

fn has_matching_ancestor(tree: &DeviceTree, id: NodeId) -> bool {
    let mut current = tree.parent(id);
    while let Some(p) = current {
        if tree.node(p).description.to_lowercase().contains("usb") {
            return true;
        }
        current = tree.parent(p);
    }
    false
}

proptest! {
    #[test]
    fn levels_follow_generations(shapes in node_shapes()) {
        let tree = build_topology(&records(&shapes));
        prop_assert_eq!(tree.roots().len(), 1);

        for id in tree.depth_first() {
            let node = tree.node(id);
            match tree.parent(id) {
                Some(p) => prop_assert_eq!(node.level, tree.node(p).level + 1),
                None => prop_assert_eq!(node.level, ROOT_LEVEL),
            }
        }
    }

    #[test]
    fn port_paths_extend_or_inherit(shapes in node_shapes()) {
        let recs = records(&shapes);
        let tree = build_topology(&recs);

        for id in tree.depth_first() {
            let node = tree.node(id);
            let Some(p) = tree.parent(id) else { continue };
            let parent = tree.node(p);
            let record = recs.iter().find(|r| r.instance_id == node.instance_id).unwrap();

            if record.location_path.is_empty() {
                prop_assert_eq!(&node.port_path, &parent.port_path);
                prop_assert_eq!(&node.port, &parent.port);
                prop_assert_eq!(&node.last_locatable_id, &parent.last_locatable_id);
            } else {
                let expected = format!("{}-{}", parent.port_path, node.port);
                prop_assert_eq!(&node.port_path, &expected);
                prop_assert!(node.port_path.starts_with(parent.port_path.as_str()));
            }
        }
    }

    #[test]
    fn extraction_without_descent_keeps_topmost(shapes in node_shapes()) {
        let tree = DeviceTree::from_records(&records(&shapes));
        let extracted = tree.extract(&is_usb, false);

        let topmost: Vec<NodeId> = tree
            .depth_first()
            .into_iter()
            .filter(|&id| is_usb(NodeRef { tree: &tree, id }) && !has_matching_ancestor(&tree, id))
            .collect();
        prop_assert_eq!(extracted.len(), topmost.len());

        for (subtree, &id) in extracted.iter().zip(&topmost) {
            let root = subtree.root_node().unwrap();
            prop_assert_eq!(&root.instance_id, &tree.node(id).instance_id);
            prop_assert_eq!(subtree.len(), 1 + tree.descendants(id).len());
        }
    }

    #[test]
    fn extraction_with_descent_finds_every_match(shapes in node_shapes()) {
        let tree = DeviceTree::from_records(&records(&shapes));
        let matches = tree
            .depth_first()
            .into_iter()
            .filter(|&id| is_usb(NodeRef { tree: &tree, id }))
            .count();
        prop_assert_eq!(tree.extract(&is_usb, true).len(), matches);
    }

    #[test]
    fn clone_reproduces_subtree(shapes in node_shapes(), pick in any::<Index>()) {
        let tree = build_topology(&records(&shapes));
        let order = tree.depth_first();
        let id = order[pick.index(order.len())];

        let copy = tree.clone_subtree(id);
        let original: Vec<NodeId> = std::iter::once(id).chain(tree.descendants(id)).collect();
        let copied = copy.depth_first();
        prop_assert_eq!(copied.len(), original.len());

        for (&c, &o) in copied.iter().zip(&original) {
            let (c, o) = (copy.node(c), tree.node(o));
            prop_assert_eq!(&c.instance_id, &o.instance_id);
            prop_assert_eq!(&c.port_path, &o.port_path);
            prop_assert_eq!(c.level, o.level);
            prop_assert_eq!(c.children().len(), o.children().len());
        }
        prop_assert!(copy.node(copied[0]).parent().is_none());
    }
}
