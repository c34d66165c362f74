//! DeclarativeAdapter: configuration-driven recognition
//!
//! Interprets a [`ParserConfig`] at runtime. Each context type's selector
//! finds candidate elements inside the parent context, its property
//! expressions are evaluated against the matched element, and its
//! insertion-point selectors resolve anchors in the element's own scope.
//!
//! Selectors and expressions are compiled once at construction. An entry
//! that fails to compile is logged and left out; only a malformed
//! namespace or an empty context table rejects the whole configuration.

use super::error::{AdapterError, AdapterResult};
use super::expression::Expression;
use super::observer::ObservationCore;
use super::parser_config::{resolve_namespace, ContextRule, ParserConfig};
use super::traits::{Adapter, ChildElement, ContextParser};
use crate::dom::{Document, ElementId, Selector};
use crate::tree::{InsertionPoint, PropertyValue};
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug)]
struct CompiledRule {
    selector: Option<Selector>,
    props: Vec<(String, Expression)>,
    insertion_points: Vec<(String, Selector)>,
    children: Vec<String>,
}

impl CompiledRule {
    fn compile(namespace: &str, context_type: &str, rule: &ContextRule) -> Self {
        let selector = rule.selector.as_deref().and_then(|source| {
            Selector::parse(source)
                .map_err(|e| {
                    warn!(namespace, context_type, selector = source, error = %e, "invalid context selector");
                })
                .ok()
        });

        let props = rule
            .props
            .iter()
            .filter_map(|(name, source)| match Expression::parse(source) {
                Ok(expr) => Some((name.clone(), expr)),
                Err(e) => {
                    warn!(namespace, context_type, property = %name, error = %e, "invalid property expression");
                    None
                }
            })
            .collect();

        let insertion_points = rule
            .insertion_points
            .iter()
            .filter_map(|(name, source)| match Selector::parse(source) {
                Ok(selector) => Some((name.clone(), selector)),
                Err(e) => {
                    warn!(namespace, context_type, insertion_point = %name, error = %e, "invalid insertion point selector");
                    None
                }
            })
            .collect();

        Self {
            selector,
            props,
            insertion_points,
            children: rule.children.clone(),
        }
    }
}

/// Compiled form of one parser configuration.
#[derive(Debug)]
pub struct DeclarativeParser {
    namespace: String,
    rules: BTreeMap<String, CompiledRule>,
}

impl DeclarativeParser {
    pub fn new(config: &ParserConfig) -> AdapterResult<Self> {
        let namespace = resolve_namespace(&config.namespace)?;
        if config.contexts.is_empty() {
            return Err(AdapterError::EmptyContextTable(namespace));
        }

        for context_type in config.unreachable_types() {
            warn!(namespace = %namespace, context_type, "context type is not reachable from root");
        }
        for (context_type, rule) in &config.contexts {
            for child in rule.children.iter().filter(|c| !config.contexts.contains_key(*c)) {
                warn!(namespace = %namespace, context_type = %context_type, child = %child, "child context type is not declared");
            }
        }

        let rules = config
            .contexts
            .iter()
            .map(|(context_type, rule)| {
                (
                    context_type.clone(),
                    CompiledRule::compile(&namespace, context_type, rule),
                )
            })
            .collect();
        Ok(Self { namespace, rules })
    }

    /// Declared context types
    pub fn context_types(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }
}

impl ContextParser for DeclarativeParser {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    fn parse_context(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<(String, PropertyValue)> {
        let Some(rule) = self.rules.get(context_type) else {
            return Vec::new();
        };
        rule.props
            .iter()
            .filter_map(|(name, expr)| match expr.evaluate(doc, element) {
                Ok(value) => Some((name.clone(), value)),
                Err(e) => {
                    warn!(
                        namespace = %self.namespace,
                        context_type,
                        property = %name,
                        error = %e,
                        "property evaluation failed"
                    );
                    None
                }
            })
            .collect()
    }

    fn find_child_elements(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<ChildElement> {
        let Some(rule) = self.rules.get(context_type) else {
            debug!(namespace = %self.namespace, context_type, "no rule for context type");
            return Vec::new();
        };

        let mut found: Vec<ChildElement> = Vec::new();
        for child_type in &rule.children {
            let Some(selector) = self.rules.get(child_type).and_then(|r| r.selector.as_ref()) else {
                continue;
            };
            for matched in selector.query_all(doc, element) {
                let candidate = ChildElement::new(matched, child_type.as_str());
                if !found.contains(&candidate) {
                    found.push(candidate);
                }
            }
        }

        // Nested matches belong to the enclosing match.
        let outer: Vec<ElementId> = found.iter().map(|c| c.element).collect();
        found.retain(|c| {
            !outer
                .iter()
                .any(|o| *o != c.element && doc.contains(*o, c.element))
        });
        found.sort_by_key(|c| doc.document_order_key(c.element));
        found
    }

    fn find_insertion_points(
        &self,
        doc: &Document,
        element: ElementId,
        context_type: &str,
    ) -> Vec<InsertionPoint> {
        let Some(rule) = self.rules.get(context_type) else {
            return Vec::new();
        };
        if rule.insertion_points.is_empty() {
            return Vec::new();
        }
        let nested = self.find_child_elements(doc, element, context_type);
        rule.insertion_points
            .iter()
            .filter_map(|(name, selector)| {
                selector
                    .query_all(doc, element)
                    .into_iter()
                    .find(|anchor| !nested.iter().any(|c| doc.contains(c.element, *anchor)))
                    .map(|anchor| InsertionPoint::new(name.as_str(), anchor))
            })
            .collect()
    }
}

/// Adapter driven by a parser configuration.
#[derive(Debug)]
pub struct DeclarativeAdapter {
    parser: DeclarativeParser,
    core: ObservationCore,
}

impl DeclarativeAdapter {
    pub fn new(observed: ElementId, config: &ParserConfig) -> AdapterResult<Self> {
        Ok(Self {
            parser: DeclarativeParser::new(config)?,
            core: ObservationCore::new(observed),
        })
    }

    /// Build the adapter for `namespace` from a set of configurations.
    pub fn for_namespace(
        observed: ElementId,
        namespace: &str,
        configs: &[ParserConfig],
    ) -> AdapterResult<Self> {
        let wanted = resolve_namespace(namespace)?;
        let config = configs
            .iter()
            .find(|c| resolve_namespace(&c.namespace).is_ok_and(|ns| ns == wanted))
            .ok_or(AdapterError::MissingConfiguration(wanted))?;
        Self::new(observed, config)
    }

    pub fn with_core(mut self, core: ObservationCore) -> Self {
        self.core = core;
        self
    }

    pub fn declarative_parser(&self) -> &DeclarativeParser {
        &self.parser
    }
}

impl Adapter for DeclarativeAdapter {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_markup;
    use crate::tree::ContextTree;

    const FEED: &str = r#"<html><body>
      <main class="feed">
        <article class="post" data-id="p1" data-author="alice">
          <p class="text">first</p>
          <div class="comment" data-id="c1"><span class="like"></span></div>
          <span class="like"></span>
        </article>
        <article class="post" data-id="p2" data-author="bob">
          <p class="text">second</p>
        </article>
      </main>
    </body></html>"#;

    fn config() -> ParserConfig {
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
      missing: ".//video/@src"
      broken: "substring-before("
    insertionPoints:
      like: ".like"
    children: [comment]
  comment:
    selector: ".comment"
    props:
      id: "string(@data-id)"
"#,
        )
        .unwrap()
    }

    #[test]
    fn posts_are_found_in_document_order() {
        let doc = parse_markup(FEED).unwrap();
        let parser = DeclarativeParser::new(&config()).unwrap();
        let posts = parser.find_child_elements(&doc, doc.body(), "root");
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|c| c.context_type == "post"));
        assert!(doc.document_order_key(posts[0].element) < doc.document_order_key(posts[1].element));
    }

    #[test]
    fn failing_properties_are_omitted() {
        let doc = parse_markup(FEED).unwrap();
        let parser = DeclarativeParser::new(&config()).unwrap();
        let post = parser.find_child_elements(&doc, doc.body(), "root")[0].element;
        let props: BTreeMap<_, _> = parser.parse_context(&doc, post, "post").into_iter().collect();

        assert_eq!(props["id"], PropertyValue::from("p1"));
        assert_eq!(props["text"], PropertyValue::from("first"));
        assert_eq!(props["missing"], PropertyValue::Null);
        assert!(!props.contains_key("broken"));
    }

    #[test]
    fn insertion_points_skip_nested_contexts() {
        let doc = parse_markup(FEED).unwrap();
        let parser = DeclarativeParser::new(&config()).unwrap();
        let post = parser.find_child_elements(&doc, doc.body(), "root")[0].element;
        let points = parser.find_insertion_points(&doc, post, "post");

        assert_eq!(points.len(), 1);
        let anchor = points[0].element;
        assert_eq!(doc.parent(anchor), Some(post));
    }

    #[test]
    fn unknown_context_type_yields_nothing() {
        let doc = parse_markup(FEED).unwrap();
        let parser = DeclarativeParser::new(&config()).unwrap();
        assert!(parser.find_child_elements(&doc, doc.body(), "profile").is_empty());
        assert!(parser.parse_context(&doc, doc.body(), "profile").is_empty());
    }

    #[test]
    fn adapter_builds_nested_layer() {
        let doc = parse_markup(FEED).unwrap();
        let mut tree = ContextTree::new();
        let mut adapter = DeclarativeAdapter::new(doc.body(), &config()).unwrap();
        adapter.start(&doc, &mut tree).unwrap();

        let root = tree.get(adapter.root().unwrap()).unwrap();
        assert_eq!(root.id.as_deref(), Some("global"));
        let ids: Vec<_> = root
            .children()
            .iter()
            .map(|k| tree.get(*k).unwrap().id.clone().unwrap())
            .collect();
        assert_eq!(ids, vec!["p1", "p2"]);

        let first = tree.get(root.children()[0]).unwrap();
        let comment = tree.get(first.children()[0]).unwrap();
        assert_eq!(comment.id.as_deref(), Some("c1"));
        assert_eq!(
            comment.namespace,
            "https://semtree.dev/ns/parser/example.near/parser/feed"
        );
    }

    #[test]
    fn construction_errors() {
        let mut empty = config();
        empty.contexts.clear();
        assert!(matches!(
            DeclarativeParser::new(&empty),
            Err(AdapterError::EmptyContextTable(_))
        ));

        let mut bad = config();
        bad.namespace = "bad namespace".to_string();
        assert!(matches!(
            DeclarativeParser::new(&bad),
            Err(AdapterError::InvalidNamespace { .. })
        ));

        let missing = DeclarativeAdapter::for_namespace(
            ElementId::from_raw(0),
            "other.near/parser/x",
            &[config()],
        );
        assert!(matches!(missing, Err(AdapterError::MissingConfiguration(_))));

        let found = DeclarativeAdapter::for_namespace(
            ElementId::from_raw(0),
            "https://semtree.dev/ns/parser/example.near/parser/feed",
            &[config()],
        );
        assert!(found.is_ok());
    }
}
