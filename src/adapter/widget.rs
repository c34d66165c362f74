//! WidgetAdapter: recognizes host-rendered widget elements
//!
//! A widget element carries an explicit scope marker and a context type.
//! Its properties are not extracted from markup: the opaque `src`
//! attribute is reported as `source`, followed by the property bag the
//! host attached to the element.

use super::microdata::marked_insertion_points;
use super::observer::ObservationCore;
use super::traits::{Adapter, ChildElement, ContextParser};
use crate::dom::{Document, ElementId};
use crate::tree::{InsertionPoint, Properties, PropertyValue};

/// Namespace of widget contexts
pub const WIDGET_NAMESPACE: &str = "https://semtree.dev/ns/widget";

/// Default tag name of widget elements
pub const DEFAULT_WIDGET_ELEMENT: &str = "bos-component";

pub const SCOPE_ATTRIBUTE: &str = "data-context-scope";
pub const TYPE_ATTRIBUTE: &str = "data-context-type";
pub const ID_ATTRIBUTE: &str = "data-context-id";
pub const SOURCE_ATTRIBUTE: &str = "src";

#[derive(Debug, Clone)]
pub struct WidgetParser {
    element_name: String,
}

impl WidgetParser {
    pub fn new(element_name: impl Into<String>) -> Self {
        Self {
            element_name: element_name.into().to_ascii_lowercase(),
        }
    }

    pub fn element_name(&self) -> &str {
        &self.element_name
    }

    fn is_widget(&self, doc: &Document, id: ElementId) -> bool {
        doc.tag(id) == Some(self.element_name.as_str())
            && doc.has_attribute(id, SCOPE_ATTRIBUTE)
            && doc.has_attribute(id, TYPE_ATTRIBUTE)
    }
}

impl Default for WidgetParser {
    fn default() -> Self {
        Self::new(DEFAULT_WIDGET_ELEMENT)
    }
}

impl ContextParser for WidgetParser {
    fn namespace(&self) -> &str {
        WIDGET_NAMESPACE
    }

    fn parse_context(
        &self,
        doc: &Document,
        element: ElementId,
        _context_type: &str,
    ) -> Vec<(String, PropertyValue)> {
        if !self.is_widget(doc, element) {
            return Vec::new();
        }
        let mut result = vec![(
            "source".to_string(),
            PropertyValue::from(doc.attribute(element, SOURCE_ATTRIBUTE)),
        )];
        if let Some(props) = doc.props(element) {
            result.extend(props.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        result
    }

    fn find_child_elements(
        &self,
        doc: &Document,
        element: ElementId,
        _context_type: &str,
    ) -> Vec<ChildElement> {
        doc.scoped_descendants(element, |id| self.is_widget(doc, id))
            .into_iter()
            .filter(|id| self.is_widget(doc, *id))
            .filter_map(|id| {
                doc.attribute(id, TYPE_ATTRIBUTE)
                    .map(|context_type| ChildElement::new(id, context_type))
            })
            .collect()
    }

    fn find_insertion_points(
        &self,
        doc: &Document,
        element: ElementId,
        _context_type: &str,
    ) -> Vec<InsertionPoint> {
        marked_insertion_points(doc, element, |id| self.is_widget(doc, id))
    }

    fn context_id(
        &self,
        doc: &Document,
        element: ElementId,
        _properties: &Properties,
    ) -> Option<String> {
        doc.attribute(element, ID_ATTRIBUTE)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// Adapter over widget elements.
#[derive(Debug)]
pub struct WidgetAdapter {
    parser: WidgetParser,
    core: ObservationCore,
}

impl WidgetAdapter {
    pub fn new(observed: ElementId, element_name: impl Into<String>) -> Self {
        Self {
            parser: WidgetParser::new(element_name),
            core: ObservationCore::new(observed),
        }
    }
}

impl Adapter for WidgetAdapter {
    fn parser(&self) -> &dyn ContextParser {
        &self.parser
    }

    fn core(&self) -> &ObservationCore {
        &self.core
    }

    fn parts(&mut self) -> (&dyn ContextParser, &mut ObservationCore) {
        (&self.parser, &mut self.core)
    }
}
