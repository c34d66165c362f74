//! ObservationCore: incremental maintenance shared by every adapter
//!
//! The core owns one layer of the context tree: a scan-root node for the
//! observed element plus everything recognized beneath it. Batches are
//! folded into a set of dirty nodes which are then reconciled against the
//! current document, so the layer is a function of the document alone.

use super::error::{AdapterError, AdapterResult};
use super::events::{ChangeSet, TreeEvent};
use super::identity::{EquivalenceKey, PositionalKey};
use super::traits::{ChildElement, ContextParser};
use crate::dom::{Document, ElementId, MutationBatch, MutationRecord};
use crate::tree::{
    ContextNode, ContextTree, NodeKey, Properties, PropertyValue, ROOT_CONTEXT_TYPE,
};
use std::collections::HashMap;
use tracing::{debug, info};

/// Lifecycle and identity bookkeeping for one adapter layer.
#[derive(Debug)]
pub struct ObservationCore {
    observed: ElementId,
    subscribed: bool,
    root: Option<NodeKey>,
    /// Element to the owned nodes anchored on it
    by_element: HashMap<ElementId, Vec<NodeKey>>,
    /// Owned nodes and their equivalence key at the last reconcile
    owned: HashMap<NodeKey, Option<String>>,
    equivalence: Box<dyn EquivalenceKey>,
}

impl ObservationCore {
    pub fn new(observed: ElementId) -> Self {
        Self {
            observed,
            subscribed: false,
            root: None,
            by_element: HashMap::new(),
            owned: HashMap::new(),
            equivalence: Box::new(PositionalKey),
        }
    }

    /// Replace the default positional equivalence key.
    pub fn with_equivalence_key(mut self, key: impl EquivalenceKey + 'static) -> Self {
        self.equivalence = Box::new(key);
        self
    }

    pub fn observed(&self) -> ElementId {
        self.observed
    }

    pub fn root(&self) -> Option<NodeKey> {
        self.root
    }

    pub fn is_started(&self) -> bool {
        self.subscribed
    }

    pub fn owns(&self, key: NodeKey) -> bool {
        self.owned.contains_key(&key)
    }

    /// Number of nodes in this layer, scan root included
    pub fn len(&self) -> usize {
        self.owned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owned.is_empty()
    }

    /// Owned nodes anchored on `element`
    pub fn nodes_for(&self, element: ElementId) -> &[NodeKey] {
        self.by_element
            .get(&element)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Full recursive scan, then accept batches. Idempotent.
    pub fn start(
        &mut self,
        parser: &dyn ContextParser,
        doc: &Document,
        tree: &mut ContextTree,
    ) -> AdapterResult<Vec<TreeEvent>> {
        if doc.get(self.observed).is_none() {
            return Err(AdapterError::ObservedElementMissing(self.observed));
        }
        self.subscribed = true;
        if self.root.is_some() {
            return Ok(Vec::new());
        }

        let mut changes = ChangeSet::default();
        let scan_root = ChildElement::new(self.observed, ROOT_CONTEXT_TYPE);
        let parent = tree.root();
        let key = self.create(parser, doc, tree, parent, &scan_root, None, &mut changes)?;
        self.root = Some(key);

        info!(
            namespace = parser.namespace(),
            contexts = self.owned.len(),
            "adapter started"
        );
        Ok(changes.into_events(parser.namespace()))
    }

    /// Release the subscription and discard every owned node. Idempotent,
    /// and safe after a start that never completed.
    pub fn stop(&mut self, namespace: &str, tree: &mut ContextTree) -> AdapterResult<Vec<TreeEvent>> {
        self.subscribed = false;

        let mut changes = ChangeSet::default();
        if let Some(root) = self.root.take() {
            self.destroy(tree, root, &mut changes)?;
        }
        let leftovers: Vec<NodeKey> = self.owned.keys().copied().collect();
        for key in leftovers {
            self.destroy(tree, key, &mut changes)?;
        }
        self.owned.clear();
        self.by_element.clear();

        let events = changes.into_events(namespace);
        if !events.is_empty() {
            info!(namespace, "adapter stopped");
        }
        Ok(events)
    }

    /// Fold a batch into dirty nodes and reconcile each of them.
    pub fn process(
        &mut self,
        parser: &dyn ContextParser,
        doc: &Document,
        tree: &mut ContextTree,
        batch: &MutationBatch,
    ) -> AdapterResult<Vec<TreeEvent>> {
        let Some(root) = self.root.filter(|_| self.subscribed) else {
            return Ok(Vec::new());
        };

        let mut dirty: Vec<NodeKey> = Vec::new();
        for record in batch.iter() {
            let target = record.target();
            if !doc.is_connected(target) || !doc.contains(self.observed, target) {
                debug!(target = %target, "skipping record outside the observed subtree");
                continue;
            }
            // Attribute changes can alter the target's own recognition, so
            // the enclosing context re-evaluates its children.
            let from = match record {
                MutationRecord::ChildList { .. } => Some(target),
                _ if target == self.observed => Some(target),
                MutationRecord::Attributes { .. } | MutationRecord::Properties { .. } => {
                    doc.parent(target)
                }
            };
            let owners = from
                .map(|element| self.nearest_owners(doc, element))
                .filter(|owners| !owners.is_empty())
                .unwrap_or_else(|| vec![root]);
            for owner in owners {
                if !dirty.contains(&owner) {
                    dirty.push(owner);
                }
            }
        }

        let marked = dirty.clone();
        dirty.retain(|key| !tree.ancestors(*key).any(|a| marked.contains(&a)));

        let mut changes = ChangeSet::default();
        for key in dirty {
            self.reconcile(parser, doc, tree, key, &mut changes)?;
        }
        Ok(changes.into_events(parser.namespace()))
    }

    /// Owned nodes on the closest element at or above `element`.
    fn nearest_owners(&self, doc: &Document, element: ElementId) -> Vec<NodeKey> {
        std::iter::once(element)
            .chain(doc.ancestors(element))
            .take_while(|id| doc.contains(self.observed, *id))
            .find_map(|id| {
                self.by_element
                    .get(&id)
                    .filter(|keys| !keys.is_empty())
                    .cloned()
            })
            .unwrap_or_default()
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        &mut self,
        parser: &dyn ContextParser,
        doc: &Document,
        tree: &mut ContextTree,
        parent: NodeKey,
        child: &ChildElement,
        equivalence: Option<String>,
        changes: &mut ChangeSet,
    ) -> AdapterResult<NodeKey> {
        let mut node =
            ContextNode::new(parser.namespace(), child.context_type.as_str()).with_element(child.element);
        node.parsed_context = collect(parser.parse_context(doc, child.element, &child.context_type));
        node.id = parser.context_id(doc, child.element, &node.parsed_context);
        node.insertion_points =
            parser.find_insertion_points(doc, child.element, &child.context_type);

        let key = tree.insert(parent, None, node)?;
        debug!(
            key = %key,
            element = %child.element,
            context_type = %child.context_type,
            "context created"
        );
        self.track(key, child.element, equivalence);
        changes.added(key);

        for grandchild in self.candidates(parser, doc, child.element, &child.context_type) {
            let equivalence =
                self.equivalence
                    .key(doc, child.element, grandchild.element, &grandchild.context_type);
            self.create(parser, doc, tree, key, &grandchild, equivalence, changes)?;
        }
        Ok(key)
    }

    /// Bring `key` and its whole subtree in line with the document.
    fn reconcile(
        &mut self,
        parser: &dyn ContextParser,
        doc: &Document,
        tree: &mut ContextTree,
        key: NodeKey,
        changes: &mut ChangeSet,
    ) -> AdapterResult<()> {
        let Some((element, context_type)) = tree
            .get(key)
            .and_then(|n| Some((n.element?, n.context_type.clone())))
        else {
            return Ok(());
        };

        self.refresh(parser, doc, tree, key, element, &context_type, changes);

        let candidates = self.candidates(parser, doc, element, &context_type);
        let mut unmatched: Vec<NodeKey> = tree
            .get(key)
            .map(|n| {
                n.children()
                    .iter()
                    .copied()
                    .filter(|k| self.owned.contains_key(k))
                    .collect()
            })
            .unwrap_or_default();
        let mut assigned: Vec<Option<NodeKey>> = vec![None; candidates.len()];
        let ids: Vec<Option<String>> = candidates
            .iter()
            .map(|c| Self::fresh_id(parser, doc, c))
            .collect();

        // Same element, same type, same entity.
        for ((slot, candidate), id) in assigned.iter_mut().zip(&candidates).zip(&ids) {
            let found = unmatched.iter().position(|k| {
                tree.get(*k).is_some_and(|n| {
                    n.element == Some(candidate.element)
                        && n.context_type == candidate.context_type
                        && same_entity(n, id.as_deref())
                })
            });
            if let Some(index) = found {
                *slot = Some(unmatched.remove(index));
            }
        }

        // Replacement: same type and equivalence key, new element. A
        // replacement reporting another id is a different entity.
        let keys: Vec<Option<String>> = candidates
            .iter()
            .map(|c| self.equivalence.key(doc, element, c.element, &c.context_type))
            .collect();
        for (((slot, candidate), equivalence), id) in
            assigned.iter_mut().zip(&candidates).zip(&keys).zip(&ids)
        {
            if slot.is_some() {
                continue;
            }
            let Some(equivalence) = equivalence else {
                continue;
            };
            let found = unmatched.iter().position(|k| {
                self.owned.get(k).and_then(Option::as_deref) == Some(equivalence.as_str())
                    && tree.get(*k).is_some_and(|n| {
                        n.context_type == candidate.context_type && same_entity(n, id.as_deref())
                    })
            });
            if let Some(index) = found {
                let survivor = unmatched.remove(index);
                self.rebind(tree, survivor, candidate.element);
                *slot = Some(survivor);
            }
        }

        for stale in unmatched {
            self.destroy(tree, stale, changes)?;
        }

        let mut order = Vec::with_capacity(candidates.len());
        let mut survivors = Vec::new();
        for ((slot, candidate), equivalence) in assigned.into_iter().zip(&candidates).zip(keys) {
            match slot {
                Some(child) => {
                    self.owned.insert(child, equivalence);
                    survivors.push(child);
                    order.push(child);
                }
                None => {
                    let child =
                        self.create(parser, doc, tree, key, candidate, equivalence, changes)?;
                    order.push(child);
                }
            }
        }
        tree.reorder_children(key, &order)?;

        for child in survivors {
            self.reconcile(parser, doc, tree, child, changes)?;
        }
        Ok(())
    }

    /// Id the parser would assign to `candidate` right now.
    fn fresh_id(parser: &dyn ContextParser, doc: &Document, candidate: &ChildElement) -> Option<String> {
        let parsed = collect(parser.parse_context(doc, candidate.element, &candidate.context_type));
        parser.context_id(doc, candidate.element, &parsed)
    }

    /// Re-parse one node in place. The id is only ever filled, never
    /// replaced; a node whose id would change is recreated by `reconcile`.
    #[allow(clippy::too_many_arguments)]
    fn refresh(
        &self,
        parser: &dyn ContextParser,
        doc: &Document,
        tree: &mut ContextTree,
        key: NodeKey,
        element: ElementId,
        context_type: &str,
        changes: &mut ChangeSet,
    ) {
        let parsed = collect(parser.parse_context(doc, element, context_type));
        let insertion_points = parser.find_insertion_points(doc, element, context_type);
        let id = parser.context_id(doc, element, &parsed);

        let Some(node) = tree.get_mut(key) else {
            return;
        };
        let mut changed = false;
        if node.id.is_none() && id.is_some() {
            node.id = id;
            changed = true;
        }
        if node.parsed_context != parsed {
            node.parsed_context = parsed;
            changed = true;
        }
        if node.insertion_points != insertion_points {
            node.insertion_points = insertion_points;
            changed = true;
        }
        if changed {
            node.touch();
            debug!(key = %key, context_type, "context updated");
            changes.updated(key);
        }
    }

    fn candidates(
        &self,
        parser: &dyn ContextParser,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<ChildElement> {
        parser
            .find_child_elements(doc, element, context_type)
            .into_iter()
            .filter(|c| c.element != element && doc.contains(element, c.element))
            .collect()
    }

    fn destroy(
        &mut self,
        tree: &mut ContextTree,
        key: NodeKey,
        changes: &mut ChangeSet,
    ) -> AdapterResult<()> {
        for node in tree.remove(key)? {
            debug!(key = %node.key, context_type = %node.context_type, "context removed");
            self.owned.remove(&node.key);
            if let Some(element) = node.element {
                self.untrack(node.key, element);
            }
            changes.removed(node.key);
        }
        Ok(())
    }

    fn rebind(&mut self, tree: &mut ContextTree, key: NodeKey, element: ElementId) {
        let Some(node) = tree.get_mut(key) else {
            return;
        };
        let previous = node.element.replace(element);
        debug!(key = %key, element = %element, "context rebound to replacement element");
        if let Some(previous) = previous {
            self.untrack(key, previous);
        }
        self.by_element.entry(element).or_default().push(key);
    }

    fn track(&mut self, key: NodeKey, element: ElementId, equivalence: Option<String>) {
        self.owned.insert(key, equivalence);
        self.by_element.entry(element).or_default().push(key);
    }

    fn untrack(&mut self, key: NodeKey, element: ElementId) {
        if let Some(keys) = self.by_element.get_mut(&element) {
            keys.retain(|k| *k != key);
            if keys.is_empty() {
                self.by_element.remove(&element);
            }
        }
    }
}

/// A node stays bound to a candidate unless both carry differing ids.
fn same_entity(node: &ContextNode, fresh: Option<&str>) -> bool {
    match (node.id.as_deref(), fresh) {
        (Some(current), Some(fresh)) => current == fresh,
        _ => true,
    }
}

/// Later pairs win over earlier ones with the same name.
fn collect(pairs: Vec<(String, PropertyValue)>) -> Properties {
    pairs.into_iter().collect()
}
