//! Adapter traits: the contract adapters implement
//!
//! Recognition and extraction live behind [`ContextParser`]. Lifecycle and
//! incremental maintenance are shared through a composed
//! [`ObservationCore`]; an [`Adapter`] only has to hand out both halves.

use super::error::AdapterResult;
use super::events::TreeEvent;
use super::observer::ObservationCore;
use crate::dom::{Document, ElementId, MutationBatch};
use crate::tree::{ContextTree, InsertionPoint, NodeKey, Properties, PropertyValue};

/// A recognized child element and the context type it was recognized as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildElement {
    pub element: ElementId,
    pub context_type: String,
}

impl ChildElement {
    pub fn new(element: ElementId, context_type: impl Into<String>) -> Self {
        Self {
            element,
            context_type: context_type.into(),
        }
    }
}

/// Recognition and extraction strategy of one adapter variant.
///
/// Implementations are read-only over the document and never touch the
/// context tree.
pub trait ContextParser: std::fmt::Debug {
    /// Namespace stamped on every node this parser produces
    fn namespace(&self) -> &str;

    /// Ordered `(name, value)` pairs extracted from `element`.
    fn parse_context(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<(String, PropertyValue)>;

    /// Nearest recognized descendants of `element`, in document order.
    ///
    /// Elements nested inside another returned element must not be listed;
    /// they are found when the returned element is scanned in turn.
    fn find_child_elements(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<ChildElement>;

    /// Named anchors in the element's own subtree.
    fn find_insertion_points(
        &self,
        _doc: &Document,
        _element: ElementId,
        _context_type: &str,
    ) -> Vec<InsertionPoint> {
        Vec::new()
    }

    /// Logical identifier of a freshly parsed context.
    ///
    /// Defaults to a non-empty `id` property.
    fn context_id(
        &self,
        _doc: &Document,
        _element: ElementId,
        properties: &Properties,
    ) -> Option<String> {
        properties
            .get("id")
            .and_then(PropertyValue::to_text)
            .filter(|id| !id.is_empty())
    }
}

/// The contract adapters implement.
///
/// Every variant is a distinct type that owns a parser and an
/// [`ObservationCore`]; the default methods route lifecycle calls through
/// the core.
pub trait Adapter: std::fmt::Debug {
    fn parser(&self) -> &dyn ContextParser;

    fn core(&self) -> &ObservationCore;

    /// Split borrow of the parser and the core.
    fn parts(&mut self) -> (&dyn ContextParser, &mut ObservationCore);

    fn namespace(&self) -> &str {
        self.parser().namespace()
    }

    /// Scan the observed subtree and begin accepting batches.
    fn start(&mut self, doc: &Document, tree: &mut ContextTree) -> AdapterResult<Vec<TreeEvent>> {
        let (parser, core) = self.parts();
        core.start(parser, doc, tree)
    }

    /// Stop accepting batches and discard every owned node.
    fn stop(&mut self, tree: &mut ContextTree) -> AdapterResult<Vec<TreeEvent>> {
        let (parser, core) = self.parts();
        core.stop(parser.namespace(), tree)
    }

    /// Apply one batch of mutation records.
    fn process(
        &mut self,
        doc: &Document,
        tree: &mut ContextTree,
        batch: &MutationBatch,
    ) -> AdapterResult<Vec<TreeEvent>> {
        let (parser, core) = self.parts();
        core.process(parser, doc, tree, batch)
    }

    fn parse_context(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<(String, PropertyValue)> {
        self.parser().parse_context(doc, element, context_type)
    }

    fn find_child_elements(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<ChildElement> {
        self.parser().find_child_elements(doc, element, context_type)
    }

    /// Scan root of this adapter's layer, while started
    fn root(&self) -> Option<NodeKey> {
        self.core().root()
    }

    fn is_started(&self) -> bool {
        self.core().is_started()
    }
}
