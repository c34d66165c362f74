//! Link index keys
//!
//! Links created on a context are stored under an index built from the
//! target's indexed conditions and the context's current values for them.

use super::matcher::is_identified;
use super::target::Target;
use crate::tree::{ContextTree, NodeKey, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkIndex {
    pub namespace: String,
    pub context_type: String,
    /// Current values of the indexed properties, sorted by name
    #[serde(rename = "if")]
    pub values: BTreeMap<String, PropertyValue>,
}

impl LinkIndex {
    /// Build the index of the context at `key` for `target`.
    ///
    /// Returns `None` for missing or unidentified contexts.
    pub fn build(tree: &ContextTree, target: &Target, key: NodeKey) -> Option<Self> {
        let node = tree.get(key)?;
        if !is_identified(node) {
            return None;
        }
        let values = target
            .conditions
            .iter()
            .filter(|(_, condition)| condition.is_indexed())
            .map(|(property, _)| {
                let value = node.property(property).cloned().unwrap_or(PropertyValue::Null);
                (property.clone(), value)
            })
            .collect();
        Some(Self {
            namespace: node.namespace.clone(),
            context_type: node.context_type.clone(),
            values,
        })
    }

    /// Deterministic string form used as a storage key
    pub fn to_key(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
