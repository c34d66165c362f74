//! Target matching over the context tree
//!
//! Matching is a pure read of the tree. Targets that reference missing
//! nodes or unresolvable ancestor chains simply do not match.

use super::target::Target;
use crate::adapter::is_declarative_namespace;
use crate::tree::{ContextNode, ContextTree, NodeKey, PropertyValue};

const NULL: PropertyValue = PropertyValue::Null;

/// Match a node's own fields, ignoring the ancestor chain.
pub fn matches_node(target: &Target, node: &ContextNode) -> bool {
    if target
        .namespace
        .as_deref()
        .is_some_and(|ns| ns != node.namespace)
    {
        return false;
    }
    if target
        .context_type
        .as_deref()
        .is_some_and(|ty| ty != node.context_type)
    {
        return false;
    }
    target.conditions.iter().all(|(property, condition)| {
        condition.evaluate(node.property(property).unwrap_or(&NULL))
    })
}

/// Does the node at `key` satisfy `target`, including its ancestor chain?
pub fn matches(tree: &ContextTree, target: &Target, key: NodeKey) -> bool {
    let Some(node) = tree.get(key) else {
        return false;
    };
    if !matches_node(target, node) {
        return false;
    }
    match &target.ancestor {
        None => true,
        Some(enclosing) => tree
            .ancestors(key)
            .any(|ancestor| matches(tree, enclosing, ancestor)),
    }
}

/// First node under `root` (inclusive) matching `target`, in pre-order.
pub fn find_context_by_target(tree: &ContextTree, target: &Target, root: NodeKey) -> Option<NodeKey> {
    if !tree.contains(root) {
        return None;
    }
    std::iter::once(root)
        .chain(tree.descendants(root))
        .find(|key| matches(tree, target, *key))
}

/// Every node under `root` (inclusive) matching `target`, in pre-order.
pub fn find_all_by_target(tree: &ContextTree, target: &Target, root: NodeKey) -> Vec<NodeKey> {
    if !tree.contains(root) {
        return Vec::new();
    }
    std::iter::once(root)
        .chain(tree.descendants(root))
        .filter(|key| matches(tree, target, *key))
        .collect()
}

/// Topmost ancestor of `key`, or `key` itself when it has no parent.
pub fn get_root_context(tree: &ContextTree, key: NodeKey) -> Option<NodeKey> {
    if !tree.contains(key) {
        return None;
    }
    Some(tree.ancestors(key).last().unwrap_or(key))
}

/// Configuration-driven contexts count as identified only with a non-empty id.
pub fn is_identified(node: &ContextNode) -> bool {
    !is_declarative_namespace(&node.namespace) || node.id.as_deref().is_some_and(|id| !id.is_empty())
}

/// Order matches by priority key, highest first; equal keys keep their
/// declaration order.
pub fn order_by_priority<T, K, F>(items: &mut [T], priority: F)
where
    K: Ord,
    F: Fn(&T) -> K,
{
    items.sort_by(|a, b| priority(b).cmp(&priority(a)));
}
