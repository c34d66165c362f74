//! Equivalence keys for re-render resilience
//!
//! When a recognized element disappears and an unmatched candidate appears
//! under the same parent context, the two are treated as the same logical
//! entity if their equivalence keys agree. Element handles are never
//! compared for this.

use crate::dom::{Document, ElementId};

/// Strategy computing the key under which a context survives replacement.
pub trait EquivalenceKey: std::fmt::Debug {
    /// Key of `element`, recognized as `context_type`, relative to the
    /// element of its parent context (`scope`). `None` opts the element
    /// out of replacement matching.
    fn key(
        &self,
        doc: &Document,
        scope: ElementId,
        element: ElementId,
        context_type: &str,
    ) -> Option<String>;
}

/// Default key: context type plus the element-child index path from the
/// parent context's element, e.g. `post@1/0/2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PositionalKey;

impl EquivalenceKey for PositionalKey {
    fn key(
        &self,
        doc: &Document,
        scope: ElementId,
        element: ElementId,
        context_type: &str,
    ) -> Option<String> {
        let path = doc.position_path(scope, element)?;
        let path: Vec<String> = path.iter().map(ToString::to_string).collect();
        Some(format!("{}@{}", context_type, path.join("/")))
    }
}

/// Key on an attribute value plus context type, ignoring position.
///
/// Useful for hosts that stamp stable keys on rendered items.
#[derive(Debug, Clone)]
pub struct AttributeKey {
    pub attribute: String,
}

impl AttributeKey {
    pub fn new(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
        }
    }
}

impl EquivalenceKey for AttributeKey {
    fn key(
        &self,
        doc: &Document,
        _scope: ElementId,
        element: ElementId,
        context_type: &str,
    ) -> Option<String> {
        let value = doc.attribute(element, &self.attribute)?;
        Some(format!("{}#{}", context_type, value))
    }
}
