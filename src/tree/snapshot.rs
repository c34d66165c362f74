//! Transferable snapshots
//!
//! Snapshots carry no element or parent references and are safe to hand
//! across an isolation boundary.

use super::node::Properties;
use serde::{Deserialize, Serialize};

/// Serializable copy of a context subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferableContext {
    pub namespace: String,
    pub context_type: String,
    pub id: Option<String>,
    pub parsed_context: Properties,
    pub children: Vec<TransferableContext>,
}

impl TransferableContext {
    /// Total number of contexts in this snapshot, including itself
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Self::count).sum::<usize>()
    }
}

/// One distinct context type and the types found beneath it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextTypeNode {
    pub context_type: String,
    pub children: Vec<ContextTypeNode>,
}

/// Fold snapshots into a tree of distinct context types.
///
/// Children of every node sharing a type are merged, so the result lists
/// each type once per level, in first-seen order.
pub fn context_type_tree(nodes: &[TransferableContext]) -> Vec<ContextTypeNode> {
    let mut groups: Vec<(&str, Vec<TransferableContext>)> = Vec::new();
    for node in nodes {
        let index = match groups.iter().position(|(ty, _)| *ty == node.context_type) {
            Some(index) => index,
            None => {
                groups.push((node.context_type.as_str(), Vec::new()));
                groups.len() - 1
            }
        };
        groups[index].1.extend(node.children.iter().cloned());
    }
    groups
        .into_iter()
        .map(|(context_type, children)| ContextTypeNode {
            context_type: context_type.to_string(),
            children: context_type_tree(&children),
        })
        .collect()
}
