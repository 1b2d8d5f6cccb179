//! Predicate-driven subtree extraction

use super::tree::{DeviceNode, DeviceTree, NodeId};

/// A node together with the tree it lives in
///
/// Matchers get the whole tree so they can look at descendants, e.g. to
/// require a controller below a hub.
#[derive(Clone, Copy)]
pub struct NodeRef<'a> {
    pub tree: &'a DeviceTree,
    pub id: NodeId,
}

impl<'a> NodeRef<'a> {
    pub fn node(&self) -> &'a DeviceNode {
        self.tree.node(self.id)
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        tree.children(self.id).iter().map(move |&id| NodeRef { tree, id })
    }

    pub fn descendants(&self) -> impl Iterator<Item = NodeRef<'a>> + 'a {
        let tree = self.tree;
        tree.descendants(self.id)
            .into_iter()
            .map(move |id| NodeRef { tree, id })
    }
}

/// Selection strategy for [`DeviceTree::extract`]
pub trait NodeMatcher {
    fn matches(&self, node: NodeRef<'_>) -> bool;
}

impl<F> NodeMatcher for F
where
    F: Fn(NodeRef<'_>) -> bool,
{
    fn matches(&self, node: NodeRef<'_>) -> bool {
        self(node)
    }
}

impl DeviceTree {
    /// Deep copies of every matching node's subtree, in pre-order
    ///
    /// With `descend` false the search stops at the first match on each
    /// branch, so no returned subtree is contained in another.
    pub fn extract<M>(&self, matcher: &M, descend: bool) -> Vec<DeviceTree>
    where
        M: NodeMatcher + ?Sized,
    {
        let mut found = Vec::new();
        let mut stack: Vec<NodeId> = self.roots().iter().rev().copied().collect();

        while let Some(id) = stack.pop() {
            let hit = matcher.matches(NodeRef { tree: self, id });
            if hit {
                found.push(self.clone_subtree(id));
            }
            if !hit || descend {
                stack.extend(self.children(id).iter().rev().copied());
            }
        }

        found
    }
}
