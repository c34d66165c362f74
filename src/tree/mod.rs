//! Semantic context tree
//!
//! An arena of [`ContextNode`]s keyed by stable [`NodeKey`]s. Parent and
//! child links are key references, so stale handles are detected with
//! [`ContextTree::contains`] rather than by dereferencing.

mod context_tree;
mod node;
mod snapshot;

#[cfg(test)]
mod tests;

pub use context_tree::{ContextTree, TreeError, TreeResult, ENGINE_NAMESPACE, ROOT_CONTEXT_TYPE};
pub use node::{ContextNode, InsertionPoint, NodeKey, NodeMetadata, Properties, PropertyValue};
pub use snapshot::{context_type_tree, ContextTypeNode, TransferableContext};
