//! Context node representation

use crate::dom::{Document, ElementId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Arena key of a context node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeKey(Uuid);

impl NodeKey {
    /// Create a new random NodeKey
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for NodeKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scalar property values extracted from the document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// String form used for identifiers and link indexes.
    ///
    /// Null renders as `None`; integral numbers render without a fraction.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Null => None,
            Self::Bool(b) => Some(b.to_string()),
            Self::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(format!("{}", *n as i64)),
            Self::Number(n) => Some(n.to_string()),
            Self::String(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<f64> for PropertyValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for PropertyValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for PropertyValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Parsed context collection
pub type Properties = BTreeMap<String, PropertyValue>;

/// A named anchor inside a context's own subtree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertionPoint {
    pub name: String,
    pub element: ElementId,
}

impl InsertionPoint {
    pub fn new(name: impl Into<String>, element: ElementId) -> Self {
        Self {
            name: name.into(),
            element,
        }
    }
}

/// Node metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// When the node was created
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
    /// When parsed context or insertion points last changed
    pub modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// A recognized entity in the context tree
#[derive(Debug, Clone, PartialEq)]
pub struct ContextNode {
    /// Arena key
    pub key: NodeKey,
    /// Logical identifier, stable across re-parses
    pub id: Option<String>,
    /// Namespace of the adapter that produced the node
    pub namespace: String,
    /// Kind of entity (e.g., "post", "profile", "root")
    pub context_type: String,
    /// Extracted properties
    pub parsed_context: Properties,
    /// Anchors discovered in the node's own subtree
    pub insertion_points: Vec<InsertionPoint>,
    /// Underlying element, used for anchoring only
    pub element: Option<ElementId>,
    /// Node metadata
    pub metadata: NodeMetadata,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
}

impl ContextNode {
    pub fn new(namespace: impl Into<String>, context_type: impl Into<String>) -> Self {
        Self {
            key: NodeKey::new(),
            id: None,
            namespace: namespace.into(),
            context_type: context_type.into(),
            parsed_context: Properties::new(),
            insertion_points: Vec::new(),
            element: None,
            metadata: NodeMetadata {
                created_at: Some(chrono::Utc::now()),
                ..Default::default()
            },
            parent: None,
            children: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_element(mut self, element: ElementId) -> Self {
        self.element = Some(element);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.parsed_context.insert(key.into(), value.into());
        self
    }

    pub fn with_insertion_point(mut self, name: impl Into<String>, element: ElementId) -> Self {
        self.insertion_points.push(InsertionPoint::new(name, element));
        self
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.parsed_context.get(name)
    }

    pub fn insertion_point(&self, name: &str) -> Option<ElementId> {
        self.insertion_points
            .iter()
            .find(|ip| ip.name == name)
            .map(|ip| ip.element)
    }

    /// Derived visibility: the element is attached and neither it nor an
    /// ancestor is hidden. Nodes without an element are always visible.
    pub fn is_visible(&self, doc: &Document) -> bool {
        let Some(element) = self.element else {
            return true;
        };
        if !doc.is_connected(element) {
            return false;
        }
        std::iter::once(element)
            .chain(doc.ancestors(element))
            .all(|id| !is_hidden(doc, id))
    }

    pub(crate) fn touch(&mut self) {
        self.metadata.modified_at = Some(chrono::Utc::now());
    }
}

fn is_hidden(doc: &Document, id: ElementId) -> bool {
    if doc.has_attribute(id, "hidden") {
        return true;
    }
    doc.attribute(id, "style").is_some_and(|style| {
        style
            .split(';')
            .filter_map(|decl| decl.split_once(':'))
            .any(|(prop, value)| {
                prop.trim().eq_ignore_ascii_case("display")
                    && value.trim().eq_ignore_ascii_case("none")
            })
    })
}
