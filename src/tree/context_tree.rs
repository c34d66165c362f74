//! ContextTree: the merged forest every adapter writes into

use super::node::{ContextNode, NodeKey};
use super::snapshot::TransferableContext;
use std::collections::HashMap;
use thiserror::Error;

/// Namespace of the synthetic document-root node
pub const ENGINE_NAMESPACE: &str = "https://semtree.dev/ns/engine";

/// Context type of the synthetic root and of every adapter's scan root
pub const ROOT_CONTEXT_TYPE: &str = "root";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("context node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("the document root context cannot be removed")]
    RootImmutable,
}

pub type TreeResult<T> = Result<T, TreeError>;

/// Arena of context nodes rooted at a synthetic document-root node.
///
/// Each adapter owns the nodes it inserted; other adapters only read them.
#[derive(Debug, Clone)]
pub struct ContextTree {
    nodes: HashMap<NodeKey, ContextNode>,
    root: NodeKey,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    pub fn new() -> Self {
        let root = ContextNode::new(ENGINE_NAMESPACE, ROOT_CONTEXT_TYPE);
        let key = root.key;
        let mut nodes = HashMap::new();
        nodes.insert(key, root);
        Self { nodes, root: key }
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    pub fn get(&self, key: NodeKey) -> Option<&ContextNode> {
        self.nodes.get(&key)
    }

    pub(crate) fn get_mut(&mut self, key: NodeKey) -> Option<&mut ContextNode> {
        self.nodes.get_mut(&key)
    }

    /// Liveness check for handles held across batches.
    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    /// Number of nodes, including the synthetic root
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// All nodes in unspecified order
    pub fn nodes(&self) -> impl Iterator<Item = &ContextNode> {
        self.nodes.values()
    }

    /// Attach `node` under `parent` at `index` (clamped; `None` appends).
    pub fn insert(
        &mut self,
        parent: NodeKey,
        index: Option<usize>,
        mut node: ContextNode,
    ) -> TreeResult<NodeKey> {
        let key = node.key;
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(TreeError::NodeNotFound(parent))?;
        let at = index
            .unwrap_or(parent_node.children.len())
            .min(parent_node.children.len());
        parent_node.children.insert(at, key);
        node.parent = Some(parent);
        self.nodes.insert(key, node);
        Ok(key)
    }

    /// Remove a node and all of its descendants.
    ///
    /// Returns the removed nodes in pre-order. Removing a missing key is a
    /// no-op.
    pub fn remove(&mut self, key: NodeKey) -> TreeResult<Vec<ContextNode>> {
        if key == self.root {
            return Err(TreeError::RootImmutable);
        }
        if !self.nodes.contains_key(&key) {
            return Ok(Vec::new());
        }

        let mut order = vec![key];
        order.extend(self.descendants(key));

        if let Some(parent) = self.nodes.get(&key).and_then(|n| n.parent) {
            if let Some(parent_node) = self.nodes.get_mut(&parent) {
                parent_node.children.retain(|c| *c != key);
            }
        }

        Ok(order
            .into_iter()
            .filter_map(|k| self.nodes.remove(&k))
            .collect())
    }

    /// Reorder the listed children of `parent` into the given order.
    ///
    /// Only the slots currently held by listed keys are permuted; children
    /// that are not listed keep their positions.
    pub fn reorder_children(&mut self, parent: NodeKey, order: &[NodeKey]) -> TreeResult<()> {
        let parent_node = self
            .nodes
            .get_mut(&parent)
            .ok_or(TreeError::NodeNotFound(parent))?;
        let listed: Vec<NodeKey> = order
            .iter()
            .filter(|k| parent_node.children.contains(k))
            .copied()
            .collect();
        let mut desired = listed.into_iter();
        for slot in parent_node.children.iter_mut() {
            if order.contains(slot) {
                if let Some(next) = desired.next() {
                    *slot = next;
                }
            }
        }
        Ok(())
    }

    /// Ancestors from the parent up to the synthetic root.
    pub fn ancestors(&self, key: NodeKey) -> impl Iterator<Item = NodeKey> + '_ {
        std::iter::successors(self.get(key).and_then(|n| n.parent), move |k| {
            self.get(*k).and_then(|n| n.parent)
        })
    }

    /// Descendants of `key` in pre-order, excluding `key`.
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeKey> = self
            .get(key)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(node) = self.get(current) {
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// Transferable snapshot of the subtree at `key`.
    pub fn snapshot(&self, key: NodeKey) -> Option<TransferableContext> {
        let node = self.get(key)?;
        Some(TransferableContext {
            namespace: node.namespace.clone(),
            context_type: node.context_type.clone(),
            id: node.id.clone(),
            parsed_context: node.parsed_context.clone(),
            children: node
                .children
                .iter()
                .filter_map(|child| self.snapshot(*child))
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree_with_chain() -> (ContextTree, NodeKey, NodeKey, NodeKey) {
        let mut tree = ContextTree::new();
        let root = tree.root();
        let feed = tree
            .insert(root, None, ContextNode::new("ns", "feed"))
            .unwrap();
        let a = tree
            .insert(feed, None, ContextNode::new("ns", "post").with_id("a"))
            .unwrap();
        let b = tree
            .insert(feed, None, ContextNode::new("ns", "post").with_id("b"))
            .unwrap();
        (tree, feed, a, b)
    }

    #[test]
    fn insert_links_parent_and_children() {
        let (tree, feed, a, b) = tree_with_chain();
        assert_eq!(tree.get(feed).unwrap().children(), &[a, b]);
        assert_eq!(tree.get(a).unwrap().parent(), Some(feed));
        assert_eq!(tree.ancestors(a).collect::<Vec<_>>(), vec![feed, tree.root()]);
    }

    #[test]
    fn insert_at_index_is_clamped() {
        let (mut tree, feed, a, b) = tree_with_chain();
        let c = tree
            .insert(feed, Some(0), ContextNode::new("ns", "post"))
            .unwrap();
        let d = tree
            .insert(feed, Some(99), ContextNode::new("ns", "post"))
            .unwrap();
        assert_eq!(tree.get(feed).unwrap().children(), &[c, a, b, d]);
    }

    #[test]
    fn remove_cascades_to_descendants() {
        let (mut tree, feed, a, b) = tree_with_chain();
        let removed = tree.remove(feed).unwrap();
        let keys: Vec<_> = removed.iter().map(|n| n.key).collect();
        assert_eq!(keys, vec![feed, a, b]);
        assert!(!tree.contains(a));
        assert!(tree.get(tree.root()).unwrap().children().is_empty());
        assert!(tree.is_empty());
    }

    #[test]
    fn removing_root_or_missing_key() {
        let (mut tree, _, a, _) = tree_with_chain();
        assert_eq!(tree.remove(tree.root()), Err(TreeError::RootImmutable));
        tree.remove(a).unwrap();
        assert!(tree.remove(a).unwrap().is_empty());
    }

    #[test]
    fn reorder_only_touches_listed_slots() {
        let (mut tree, feed, a, b) = tree_with_chain();
        let other = tree
            .insert(feed, Some(1), ContextNode::new("other-ns", "badge"))
            .unwrap();
        tree.reorder_children(feed, &[b, a]).unwrap();
        assert_eq!(tree.get(feed).unwrap().children(), &[b, other, a]);
    }

    #[test]
    fn snapshot_mirrors_structure() {
        let (tree, feed, _, _) = tree_with_chain();
        let snapshot = tree.snapshot(feed).unwrap();
        assert_eq!(snapshot.context_type, "feed");
        let ids: Vec<_> = snapshot.children.iter().map(|c| c.id.as_deref()).collect();
        assert_eq!(ids, vec![Some("a"), Some("b")]);
    }
}
