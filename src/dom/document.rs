//! Arena-backed document tree

use super::mutation::{MutationBatch, MutationRecord};
use crate::tree::PropertyValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

/// Handle to an element in a [`Document`].
///
/// Handles are never reused, so a handle to a removed element stays
/// distinguishable from every element created later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(u64);

impl ElementId {
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_raw(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Errors raised by document edits
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomError {
    #[error("element not found: {0}")]
    ElementNotFound(ElementId),

    #[error("{child} is not a child of {parent}")]
    NotAChild { parent: ElementId, child: ElementId },

    #[error("inserting {child} into {parent} would create a cycle")]
    HierarchyCycle { parent: ElementId, child: ElementId },

    #[error("the document root cannot be moved or removed")]
    RootImmutable,
}

pub type DomResult<T> = Result<T, DomError>;

/// A child slot of an element.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Element(ElementId),
    Text(String),
}

/// An element and its local state.
#[derive(Debug, Clone)]
pub struct Element {
    tag: String,
    attributes: Vec<(String, String)>,
    children: Vec<Child>,
    parent: Option<ElementId>,
    props: BTreeMap<String, PropertyValue>,
}

impl Element {
    fn new(tag: String) -> Self {
        Self {
            tag,
            attributes: Vec::new(),
            children: Vec::new(),
            parent: None,
            props: BTreeMap::new(),
        }
    }

    /// Lowercase tag name
    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.iter().any(|(n, _)| n == name)
    }

    /// Attributes in insertion order
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn children(&self) -> &[Child] {
        &self.children
    }

    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    /// Property bag supplied by the host alongside the markup
    pub fn props(&self) -> &BTreeMap<String, PropertyValue> {
        &self.props
    }

    fn child_elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.children.iter().filter_map(|c| match c {
            Child::Element(id) => Some(*id),
            Child::Text(_) => None,
        })
    }
}

/// A live document the host mutates.
///
/// Every edit queues a [`MutationRecord`]; [`Document::take_records`]
/// drains them into a batch for ingestion. Removed elements stay in the
/// arena (detached) so late records that mention them still resolve.
#[derive(Debug, Clone)]
pub struct Document {
    elements: HashMap<ElementId, Element>,
    root: ElementId,
    next_id: u64,
    pending: Vec<MutationRecord>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    /// Create an empty document whose root is an `html` element.
    pub fn new() -> Self {
        let root = ElementId(0);
        let mut elements = HashMap::new();
        elements.insert(root, Element::new("html".to_string()));
        Self {
            elements,
            root,
            next_id: 1,
            pending: Vec::new(),
        }
    }

    pub fn root(&self) -> ElementId {
        self.root
    }

    /// The first `body` child of the root, or the root itself.
    pub fn body(&self) -> ElementId {
        self.element_children(self.root)
            .into_iter()
            .find(|id| self.tag(*id) == Some("body"))
            .unwrap_or(self.root)
    }

    /// Create a detached element.
    pub fn create_element(&mut self, tag: impl Into<String>) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        self.elements
            .insert(id, Element::new(tag.into().to_ascii_lowercase()));
        id
    }

    pub fn get(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    fn get_mut(&mut self, id: ElementId) -> DomResult<&mut Element> {
        self.elements
            .get_mut(&id)
            .ok_or(DomError::ElementNotFound(id))
    }

    fn require(&self, id: ElementId) -> DomResult<&Element> {
        self.elements.get(&id).ok_or(DomError::ElementNotFound(id))
    }

    pub fn tag(&self, id: ElementId) -> Option<&str> {
        self.get(id).map(Element::tag)
    }

    pub fn attribute(&self, id: ElementId, name: &str) -> Option<&str> {
        self.get(id).and_then(|e| e.attribute(name))
    }

    pub fn has_attribute(&self, id: ElementId, name: &str) -> bool {
        self.get(id).is_some_and(|e| e.has_attribute(name))
    }

    pub fn props(&self, id: ElementId) -> Option<&BTreeMap<String, PropertyValue>> {
        self.get(id).map(Element::props)
    }

    pub fn parent(&self, id: ElementId) -> Option<ElementId> {
        self.get(id).and_then(Element::parent)
    }

    pub fn element_children(&self, id: ElementId) -> Vec<ElementId> {
        self.get(id)
            .map(|e| e.child_elements().collect())
            .unwrap_or_default()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: ElementId, out: &mut String) {
        let Some(element) = self.get(id) else {
            return;
        };
        for child in &element.children {
            match child {
                Child::Text(text) => out.push_str(text),
                Child::Element(child_id) => self.collect_text(*child_id, out),
            }
        }
    }

    /// Ancestors from the parent upwards.
    pub fn ancestors(&self, id: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        std::iter::successors(self.parent(id), move |current| self.parent(*current))
    }

    /// True if the element is attached to the document root.
    pub fn is_connected(&self, id: ElementId) -> bool {
        id == self.root || self.ancestors(id).any(|a| a == self.root)
    }

    /// True if `node` is `ancestor` or lies inside it.
    pub fn contains(&self, ancestor: ElementId, node: ElementId) -> bool {
        if !self.elements.contains_key(&node) {
            return false;
        }
        node == ancestor || self.ancestors(node).any(|a| a == ancestor)
    }

    /// All descendants of `id` in document order, excluding `id`.
    pub fn descendants(&self, id: ElementId) -> Vec<ElementId> {
        self.scoped_descendants(id, |_| false)
    }

    /// Descendants of `scope` in document order, not descending into
    /// elements for which `is_boundary` holds. Boundary elements themselves
    /// are included.
    pub fn scoped_descendants(
        &self,
        scope: ElementId,
        is_boundary: impl Fn(ElementId) -> bool,
    ) -> Vec<ElementId> {
        let mut out = Vec::new();
        let mut stack: Vec<ElementId> = self.element_children(scope);
        stack.reverse();
        while let Some(current) = stack.pop() {
            out.push(current);
            if is_boundary(current) {
                continue;
            }
            let mut children = self.element_children(current);
            children.reverse();
            stack.extend(children);
        }
        out
    }

    /// Position of `id` among its parent's element children.
    pub fn element_index(&self, id: ElementId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.get(parent)?.child_elements().position(|c| c == id)
    }

    /// Element-child indices leading from `scope` down to `id`.
    ///
    /// Returns `None` when `id` is not inside `scope`.
    pub fn position_path(&self, scope: ElementId, id: ElementId) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = id;
        while current != scope {
            path.push(self.element_index(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }

    /// Sort key placing elements in document order.
    pub fn document_order_key(&self, id: ElementId) -> Vec<usize> {
        let top = self.ancestors(id).last().unwrap_or(id);
        self.position_path(top, id).unwrap_or_default()
    }

    /// First element in document order whose `id` attribute equals `value`.
    pub fn get_element_by_id(&self, value: &str) -> Option<ElementId> {
        self.descendants(self.root)
            .into_iter()
            .find(|id| self.attribute(*id, "id") == Some(value))
    }

    // --- Edits ---

    pub fn set_attribute(
        &mut self,
        id: ElementId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> DomResult<()> {
        let name = name.into();
        let value = value.into();
        let element = self.get_mut(id)?;
        let old_value = match element.attributes.iter().position(|(n, _)| *n == name) {
            Some(index) => Some(std::mem::replace(&mut element.attributes[index].1, value)),
            None => {
                element.attributes.push((name.clone(), value));
                None
            }
        };
        self.pending.push(MutationRecord::Attributes {
            target: id,
            name,
            old_value,
        });
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: ElementId, name: &str) -> DomResult<Option<String>> {
        let element = self.get_mut(id)?;
        let Some(index) = element.attributes.iter().position(|(n, _)| n == name) else {
            return Ok(None);
        };
        let (_, old) = element.attributes.remove(index);
        self.pending.push(MutationRecord::Attributes {
            target: id,
            name: name.to_string(),
            old_value: Some(old.clone()),
        });
        Ok(Some(old))
    }

    /// Replace the host-supplied property bag of an element.
    pub fn set_props(
        &mut self,
        id: ElementId,
        props: BTreeMap<String, PropertyValue>,
    ) -> DomResult<()> {
        self.get_mut(id)?.props = props;
        self.pending.push(MutationRecord::Properties { target: id });
        Ok(())
    }

    pub fn append_child(&mut self, parent: ElementId, child: ElementId) -> DomResult<()> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` into `parent` before `reference` (or last).
    ///
    /// A child that is already attached elsewhere is moved.
    pub fn insert_before(
        &mut self,
        parent: ElementId,
        child: ElementId,
        reference: Option<ElementId>,
    ) -> DomResult<()> {
        self.require(parent)?;
        self.require(child)?;
        if child == self.root {
            return Err(DomError::RootImmutable);
        }
        if self.contains(child, parent) {
            return Err(DomError::HierarchyCycle { parent, child });
        }
        if reference == Some(child) {
            return Ok(());
        }
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    child: reference,
                });
            }
        }

        self.detach(child);

        let parent_element = self.get_mut(parent)?;
        let index = reference
            .and_then(|r| {
                parent_element
                    .children
                    .iter()
                    .position(|c| *c == Child::Element(r))
            })
            .unwrap_or(parent_element.children.len());
        parent_element.children.insert(index, Child::Element(child));
        self.get_mut(child)?.parent = Some(parent);

        self.pending.push(MutationRecord::ChildList {
            target: parent,
            added: vec![child],
            removed: vec![],
        });
        Ok(())
    }

    pub fn remove_child(&mut self, parent: ElementId, child: ElementId) -> DomResult<()> {
        self.require(child)?;
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotAChild { parent, child });
        }
        self.detach(child);
        Ok(())
    }

    /// Detach an element from wherever it is attached.
    pub fn remove(&mut self, id: ElementId) -> DomResult<()> {
        self.require(id)?;
        if id == self.root {
            return Err(DomError::RootImmutable);
        }
        self.detach(id);
        Ok(())
    }

    /// Put `new_child` where `old_child` was.
    pub fn replace_child(
        &mut self,
        parent: ElementId,
        new_child: ElementId,
        old_child: ElementId,
    ) -> DomResult<()> {
        self.require(new_child)?;
        if self.parent(old_child) != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                child: old_child,
            });
        }
        if new_child == old_child {
            return Ok(());
        }
        if new_child == self.root {
            return Err(DomError::RootImmutable);
        }
        if self.contains(new_child, parent) {
            return Err(DomError::HierarchyCycle {
                parent,
                child: new_child,
            });
        }

        self.detach(new_child);

        let parent_element = self.get_mut(parent)?;
        if let Some(slot) = parent_element
            .children
            .iter_mut()
            .find(|c| **c == Child::Element(old_child))
        {
            *slot = Child::Element(new_child);
        }
        self.get_mut(old_child)?.parent = None;
        self.get_mut(new_child)?.parent = Some(parent);

        self.pending.push(MutationRecord::ChildList {
            target: parent,
            added: vec![new_child],
            removed: vec![old_child],
        });
        Ok(())
    }

    pub fn append_text(&mut self, parent: ElementId, text: impl Into<String>) -> DomResult<()> {
        self.get_mut(parent)?.children.push(Child::Text(text.into()));
        self.pending.push(MutationRecord::ChildList {
            target: parent,
            added: vec![],
            removed: vec![],
        });
        Ok(())
    }

    /// Replace every child of an element with a single text node.
    pub fn set_text(&mut self, id: ElementId, text: impl Into<String>) -> DomResult<()> {
        let text = text.into();
        let element = self.get_mut(id)?;
        let old_children = std::mem::take(&mut element.children);
        if !text.is_empty() {
            element.children.push(Child::Text(text));
        }
        let mut removed = Vec::new();
        for child in old_children {
            if let Child::Element(child_id) = child {
                self.get_mut(child_id)?.parent = None;
                removed.push(child_id);
            }
        }
        self.pending.push(MutationRecord::ChildList {
            target: id,
            added: vec![],
            removed,
        });
        Ok(())
    }

    /// Deep-copy an element into a new detached subtree.
    ///
    /// Copies are fresh handles; nothing is recorded until they are
    /// inserted.
    pub fn clone_subtree(&mut self, id: ElementId) -> DomResult<ElementId> {
        let source = self.require(id)?.clone();
        let copy = self.create_element(source.tag.clone());
        let mut children = Vec::with_capacity(source.children.len());
        for child in &source.children {
            match child {
                Child::Text(text) => children.push(Child::Text(text.clone())),
                Child::Element(child_id) => {
                    let child_copy = self.clone_subtree(*child_id)?;
                    self.get_mut(child_copy)?.parent = Some(copy);
                    children.push(Child::Element(child_copy));
                }
            }
        }
        let element = self.get_mut(copy)?;
        element.attributes = source.attributes;
        element.props = source.props;
        element.children = children;
        Ok(copy)
    }

    /// Drain queued records into a batch.
    pub fn take_records(&mut self) -> MutationBatch {
        MutationBatch::new(std::mem::take(&mut self.pending))
    }

    fn detach(&mut self, id: ElementId) {
        let Some(old_parent) = self.parent(id) else {
            return;
        };
        if let Some(parent) = self.elements.get_mut(&old_parent) {
            parent.children.retain(|c| *c != Child::Element(id));
        }
        if let Some(element) = self.elements.get_mut(&id) {
            element.parent = None;
        }
        self.pending.push(MutationRecord::ChildList {
            target: old_parent,
            added: vec![],
            removed: vec![id],
        });
    }
}
