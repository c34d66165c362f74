//! Common test utilities for semtree integration tests
//!
//! Engine construction over markup fixtures, lookups by namespace and id,
//! and a structural check of an adapter layer against the document.

#![allow(dead_code)]

use semtree::dom::Document;
use semtree::tree::ContextTree;
use semtree::{ElementId, Engine, EngineConfig, NodeKey, ParserConfig};

pub const FEED_NAMESPACE: &str = "https://semtree.dev/ns/parser/example.near/parser/feed";

/// Declarative configuration for a simple social feed.
pub fn feed_config() -> ParserConfig {
    ParserConfig::from_yaml(
        r#"
namespace: example.near/parser/feed
contexts:
  root:
    props:
      id: "string('global')"
    children: [post]
  post:
    selector: ".post"
    props:
      id: "string(@data-id)"
      authorUsername: "string(@data-author)"
      text: "normalize-space(string(.//p))"
    insertionPoints:
      southPanel: ".south"
    children: [comment]
  comment:
    selector: ".comment"
    props:
      id: "string(@data-id)"
"#,
    )
    .expect("feed config parses")
}

/// Started engine over `markup` with `config`.
pub fn started(markup: &str, config: &EngineConfig) -> Engine {
    let mut engine = Engine::from_markup(markup, config).expect("engine builds");
    engine.start().expect("engine starts");
    engine
}

/// Started engine with the feed parser attached.
pub fn started_with_feed(markup: &str) -> Engine {
    started(markup, &EngineConfig::default().with_parser_config(feed_config()))
}

/// Layer root of the adapter for `namespace`.
pub fn layer_root(engine: &Engine, namespace: &str) -> NodeKey {
    engine
        .adapter(namespace)
        .and_then(|a| a.root())
        .expect("adapter is started")
}

/// Contexts of `namespace` with `context_type`, in pre-order.
pub fn contexts_of(engine: &Engine, namespace: &str, context_type: &str) -> Vec<NodeKey> {
    let tree = engine.tree();
    tree.descendants(layer_root(engine, namespace))
        .into_iter()
        .filter(|k| tree.get(*k).is_some_and(|n| n.context_type == context_type))
        .collect()
}

/// Context of `namespace` carrying `id`.
pub fn find_by_id(engine: &Engine, namespace: &str, id: &str) -> Option<NodeKey> {
    let tree = engine.tree();
    tree.descendants(layer_root(engine, namespace))
        .into_iter()
        .find(|k| tree.get(*k).is_some_and(|n| n.id.as_deref() == Some(id)))
}

/// Ids of the children of `key`, in order.
pub fn child_ids(tree: &ContextTree, key: NodeKey) -> Vec<Option<String>> {
    tree.get(key)
        .map(|n| {
            n.children()
                .iter()
                .map(|c| tree.get(*c).and_then(|c| c.id.clone()))
                .collect()
        })
        .unwrap_or_default()
}

/// Assert that the layer rooted at `root` mirrors the recognized elements
/// of `doc` below `observed`.
///
/// Every recognized element has exactly one node, each node's parent is
/// the node of the nearest recognized ancestor element (or the layer
/// root), and siblings are in document order.
pub fn assert_homomorphic<F>(doc: &Document, tree: &ContextTree, root: NodeKey, observed: ElementId, recognized: F)
where
    F: Fn(&Document, ElementId) -> bool,
{
    let mut expected: Vec<(ElementId, ElementId)> = doc
        .descendants(observed)
        .into_iter()
        .filter(|e| recognized(doc, *e))
        .map(|e| {
            let parent = doc
                .ancestors(e)
                .take_while(|a| *a != observed)
                .find(|a| recognized(doc, *a))
                .unwrap_or(observed);
            (e, parent)
        })
        .collect();

    let mut actual: Vec<(ElementId, ElementId)> = Vec::new();
    for key in std::iter::once(root).chain(tree.descendants(root)) {
        let node = tree.get(key).expect("layer node is live");
        if key != root {
            let element = node.element.expect("layer nodes are anchored");
            let parent = node
                .parent()
                .and_then(|p| tree.get(p))
                .and_then(|p| p.element)
                .expect("parent is anchored");
            actual.push((element, parent));
        }

        let order: Vec<Vec<usize>> = node
            .children()
            .iter()
            .filter_map(|c| tree.get(*c).and_then(|c| c.element))
            .map(|e| doc.document_order_key(e))
            .collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted, "children of {key} out of document order");
    }

    expected.sort();
    actual.sort();
    assert_eq!(actual, expected, "layer does not mirror the document");
}
