//! Best-effort HTML/XHTML loader
//!
//! Built on `quick-xml` with end-name checks disabled. HTML void elements,
//! valueless attributes and stray end tags are tolerated; anything the
//! reader cannot tokenize at all is reported as a syntax error.

use super::document::{Document, DomError, ElementId};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::debug;

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

#[derive(Debug, Error)]
pub enum MarkupError {
    #[error("markup syntax error: {0}")]
    Syntax(#[from] quick_xml::Error),

    #[error(transparent)]
    Dom(#[from] DomError),
}

/// Parse markup into a fresh document.
///
/// An `<html>` element maps onto the document root. The returned document
/// has no pending mutation records.
pub fn parse_markup(input: &str) -> Result<Document, MarkupError> {
    let mut doc = Document::new();
    let mut stack: Vec<ElementId> = vec![doc.root()];

    let mut reader = Reader::from_str(input);
    reader.config_mut().check_end_names = false;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let tag = lossy(e.name().as_ref()).to_ascii_lowercase();
                if tag == "html" && stack.len() == 1 {
                    let root = doc.root();
                    copy_attributes(&mut doc, root, &e)?;
                    stack.push(root);
                    continue;
                }
                let parent = *stack.last().unwrap_or(&doc.root());
                let element = open_element(&mut doc, parent, &tag, &e)?;
                if !VOID_ELEMENTS.contains(&tag.as_str()) {
                    stack.push(element);
                }
            }
            Event::Empty(e) => {
                let tag = lossy(e.name().as_ref()).to_ascii_lowercase();
                let parent = *stack.last().unwrap_or(&doc.root());
                open_element(&mut doc, parent, &tag, &e)?;
            }
            Event::End(e) => {
                let tag = lossy(e.name().as_ref()).to_ascii_lowercase();
                let open = stack
                    .iter()
                    .rposition(|id| doc.tag(*id) == Some(tag.as_str()));
                match open {
                    Some(index) if index > 0 => stack.truncate(index),
                    _ => debug!(tag = %tag, "ignoring unmatched end tag"),
                }
            }
            Event::Text(e) => {
                let text = match e.unescape() {
                    Ok(text) => text.into_owned(),
                    Err(_) => lossy(&e),
                };
                if !text.is_empty() {
                    let parent = *stack.last().unwrap_or(&doc.root());
                    doc.append_text(parent, text)?;
                }
            }
            Event::CData(e) => {
                let parent = *stack.last().unwrap_or(&doc.root());
                doc.append_text(parent, lossy(&e))?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    doc.take_records();
    Ok(doc)
}

fn open_element(
    doc: &mut Document,
    parent: ElementId,
    tag: &str,
    start: &BytesStart<'_>,
) -> Result<ElementId, MarkupError> {
    let element = doc.create_element(tag);
    copy_attributes(doc, element, start)?;
    doc.append_child(parent, element)?;
    Ok(element)
}

fn copy_attributes(
    doc: &mut Document,
    element: ElementId,
    start: &BytesStart<'_>,
) -> Result<(), MarkupError> {
    let mut attributes = start.html_attributes();
    attributes.with_checks(false);
    for attr in attributes {
        let attr = match attr {
            Ok(attr) => attr,
            Err(err) => {
                debug!(error = %err, "skipping malformed attribute");
                continue;
            }
        };
        let name = lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value = match attr.unescape_value() {
            Ok(value) => value.into_owned(),
            Err(_) => lossy(&attr.value),
        };
        doc.set_attribute(element, name, value)?;
    }
    Ok(())
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_markup_with_void_elements() {
        let doc = parse_markup(
            r#"<!DOCTYPE html>
            <html lang="en"><body>
              <div itemscope itemtype="person">
                <span itemprop="name">Alice</span>
                <img itemprop="photo" src="/a.png">
              </div>
            </body></html>"#,
        )
        .unwrap();

        assert_eq!(doc.attribute(doc.root(), "lang"), Some("en"));
        let body = doc.body();
        assert_eq!(doc.tag(body), Some("body"));
        let person = doc.element_children(body)[0];
        assert!(doc.has_attribute(person, "itemscope"));
        let children = doc.element_children(person);
        assert_eq!(children.len(), 2);
        assert_eq!(doc.attribute(children[1], "src"), Some("/a.png"));
        assert_eq!(doc.text_content(children[0]), "Alice");
    }

    #[test]
    fn stray_end_tags_are_ignored() {
        let doc = parse_markup("<body><p>one</span></p><p>two</p></body>").unwrap();
        let paragraphs = doc.element_children(doc.body());
        assert_eq!(paragraphs.len(), 2);
        assert_eq!(doc.text_content(paragraphs[1]), "two");
    }

    #[test]
    fn loaded_document_has_no_pending_records() {
        let mut doc = parse_markup("<body><p>x</p></body>").unwrap();
        assert!(doc.take_records().is_empty());
    }
}
