//! MicrodataAdapter: recognizes `itemtype` scopes
//!
//! The item type becomes the context type. Properties are the `itemprop`
//! elements of the scope that are not nested inside a further scope, valued
//! by element kind.

use super::observer::ObservationCore;
use super::traits::{Adapter, ChildElement, ContextParser};
use crate::dom::{Document, ElementId};
use crate::tree::{InsertionPoint, Properties, PropertyValue};

/// Namespace of microdata contexts
pub const MICRODATA_NAMESPACE: &str = "https://semtree.dev/ns/microdata";

/// Attribute naming an insertion point inside a context's own subtree
pub const INSERTION_POINT_ATTRIBUTE: &str = "data-insertion-point";

const URL_ELEMENTS: &[&str] = &[
    "audio", "embed", "iframe", "img", "source", "track", "video", "a", "area", "link",
];

#[derive(Debug, Clone, Default)]
pub struct MicrodataParser;

impl MicrodataParser {
    fn is_scope(doc: &Document, id: ElementId) -> bool {
        doc.has_attribute(id, "itemscope") || doc.has_attribute(id, "itemtype")
    }

    /// Value of one `itemprop` element.
    pub fn property_value(doc: &Document, element: ElementId) -> PropertyValue {
        if doc.has_attribute(element, "itemscope") {
            return PropertyValue::Null;
        }
        let attr = |name: &str| doc.attribute(element, name);
        let or_empty = |value: Option<&str>| PropertyValue::from(value.unwrap_or(""));
        match doc.tag(element).unwrap_or_default() {
            "meta" => attr("content").map(str::trim).into(),
            tag if URL_ELEMENTS.contains(&tag) => {
                let url = attr("src")
                    .filter(|s| !s.is_empty())
                    .or_else(|| attr("href"));
                or_empty(url)
            }
            "object" => or_empty(attr("data")),
            "data" | "meter" => or_empty(attr("value")),
            "time" => or_empty(attr("datetime")),
            _ => match attr("content") {
                Some(content) => content.trim().into(),
                None => doc.text_content(element).trim().into(),
            },
        }
    }
}

impl ContextParser for MicrodataParser {
    fn namespace(&self) -> &str {
        MICRODATA_NAMESPACE
    }

    fn parse_context(
        &self,
        doc: &Document,
        element: ElementId,
        _context_type: &str,
    ) -> Vec<(String, PropertyValue)> {
        let mut result: Vec<(String, PropertyValue)> = doc
            .scoped_descendants(element, |id| Self::is_scope(doc, id))
            .into_iter()
            .filter_map(|id| {
                let name = doc.attribute(id, "itemprop")?;
                Some((name.to_string(), Self::property_value(doc, id)))
            })
            .collect();
        if let Some(id) = doc.attribute(element, "itemid") {
            result.push(("id".to_string(), id.into()));
        }
        result
    }

    fn find_child_elements(
        &self,
        doc: &Document,
        element: ElementId,
        _context_type: &str,
    ) -> Vec<ChildElement> {
        doc.scoped_descendants(element, |id| doc.has_attribute(id, "itemtype"))
            .into_iter()
            .filter_map(|id| {
                doc.attribute(id, "itemtype")
                    .map(|item_type| ChildElement::new(id, item_type))
            })
            .collect()
    }

    fn find_insertion_points(
        &self,
        doc: &Document,
        element: ElementId,
        _context_type: &str,
    ) -> Vec<InsertionPoint> {
        marked_insertion_points(doc, element, |id| doc.has_attribute(id, "itemtype"))
    }

    fn context_id(
        &self,
        doc: &Document,
        element: ElementId,
        _properties: &Properties,
    ) -> Option<String> {
        doc.attribute(element, "itemid")
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }
}

/// Elements carrying [`INSERTION_POINT_ATTRIBUTE`] in the scope of
/// `element`, stopping at nested contexts.
pub(crate) fn marked_insertion_points(
    doc: &Document,
    element: ElementId,
    is_context: impl Fn(ElementId) -> bool,
) -> Vec<InsertionPoint> {
    doc.scoped_descendants(element, &is_context)
        .into_iter()
        .filter(|id| !is_context(*id))
        .filter_map(|id| {
            doc.attribute(id, INSERTION_POINT_ATTRIBUTE)
                .map(|name| InsertionPoint::new(name, id))
        })
        .collect()
}

/// Adapter over microdata markup.
#[derive(Debug)]
pub struct MicrodataAdapter {
    parser: MicrodataParser,
    core: ObservationCore,
}

impl MicrodataAdapter {
    pub fn new(observed: ElementId) -> Self {
        Self {
            parser: MicrodataParser,
            core: ObservationCore::new(observed),
        }
    }

    pub fn with_core(core: ObservationCore) -> Self {
        Self {
            parser: MicrodataParser,
            core,
        }
    }
}

impl Adapter for MicrodataAdapter {
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
