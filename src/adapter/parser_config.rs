//! Parser configurations for the declarative adapter
//!
//! A configuration maps context types to a selector, property expressions,
//! insertion-point selectors and the child types searched beneath them.
//! Configurations are read from JSON or YAML.

use super::error::{AdapterError, AdapterResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use url::Url;

/// Every declarative namespace lives under this prefix
pub const DECLARATIVE_NAMESPACE_PREFIX: &str = "https://semtree.dev/ns/parser/";

/// A per-namespace parser configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserConfig {
    /// Local id (`example.near/parser/feed`) or full namespace URI
    pub namespace: String,
    #[serde(default)]
    pub contexts: BTreeMap<String, ContextRule>,
}

/// Recognition and extraction rules for one context type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRule {
    /// CSS-like selector; `root` needs none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    /// Property name to expression
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, String>,
    /// Insertion point name to selector
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub insertion_points: BTreeMap<String, String>,
    /// Context types searched within matched elements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<String>,
}

impl ParserConfig {
    pub fn from_json(input: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(input)
    }

    pub fn from_yaml(input: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(input)
    }

    /// Context types reachable from `root` through `children`, breadth first.
    pub fn reachable_types(&self) -> Vec<&str> {
        let mut order = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([crate::tree::ROOT_CONTEXT_TYPE]);
        while let Some(context_type) = queue.pop_front() {
            let Some(rule) = self.contexts.get(context_type) else {
                continue;
            };
            if !seen.insert(context_type) {
                continue;
            }
            order.push(context_type);
            queue.extend(rule.children.iter().map(String::as_str));
        }
        order
    }

    /// Declared context types that can never be recognized.
    pub fn unreachable_types(&self) -> Vec<&str> {
        let reachable = self.reachable_types();
        self.contexts
            .keys()
            .map(String::as_str)
            .filter(|ty| !reachable.contains(ty))
            .collect()
    }
}

/// Expand a configuration namespace into its full URI.
///
/// Local ids are placed under [`DECLARATIVE_NAMESPACE_PREFIX`]; full URIs
/// must already live there.
pub fn resolve_namespace(namespace: &str) -> AdapterResult<String> {
    let invalid = |reason: &str| AdapterError::InvalidNamespace {
        namespace: namespace.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        return Err(invalid("namespace is empty"));
    }

    let full = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        if trimmed
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '#' | '?'))
        {
            return Err(invalid("local ids may not contain whitespace, '#' or '?'"));
        }
        format!(
            "{}{}",
            DECLARATIVE_NAMESPACE_PREFIX,
            trimmed.trim_start_matches('/')
        )
    };

    let url = Url::parse(&full).map_err(|e| invalid(&e.to_string()))?;
    let local = full
        .strip_prefix(DECLARATIVE_NAMESPACE_PREFIX)
        .ok_or_else(|| invalid("outside the parser namespace family"))?;
    if local.is_empty() || url.fragment().is_some() || url.query().is_some() {
        return Err(invalid("missing or malformed local id"));
    }
    Ok(full)
}

/// True for namespaces produced by declarative parsers.
pub fn is_declarative_namespace(namespace: &str) -> bool {
    namespace.starts_with(DECLARATIVE_NAMESPACE_PREFIX)
}
