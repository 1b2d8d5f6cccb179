//! Device topology
//!
//! Builds the USB forest from a flat directory snapshot:
//! - [`location`]: port-path parsing
//! - [`tree`]: the arena tree, position propagation and levels
//! - [`matcher`]: predicate-driven subtree extraction

pub mod location;
pub mod matcher;
pub mod tree;

pub use location::{hops, parse_port_path, port_of};
pub use matcher::{NodeMatcher, NodeRef};
pub use tree::{DeviceNode, DeviceTree, NodeId};

use common::DeviceRecord;

/// Level given to the top-most USB node of each branch
///
/// Host controller and root hub take -2 and -1, so a hub plugged straight
/// into the machine sits at level 0.
pub const ROOT_LEVEL: i32 = -2;

/// Build the USB forest from directory records
///
/// Keeps the top-most node of every branch whose description mentions
/// "usb" and everything below it, then assigns levels from [`ROOT_LEVEL`].
pub fn build_topology(records: &[DeviceRecord]) -> DeviceTree {
    let full = DeviceTree::from_records(records);
    let is_usb = |n: NodeRef<'_>| n.node().description.to_lowercase().contains("usb");

    let mut forest = DeviceTree::from_subtrees(full.extract(&is_usb, false));
    forest.assign_levels(ROOT_LEVEL);
    forest
}
