//! Tree synchronization: the context tree follows document edits
//!
//! Covers the initial scan, structural and attribute mutations, identity
//! continuity across re-renders and the adapter lifecycle.
//!
//! ## Equivalence key
//! Replacement is recognized with the default positional key: the
//! candidate's context type plus its element-index path from the parent
//! context's element (`post@0/1`). A replacement element at the same path
//! with the same type keeps the old node, its key and its id.

mod common;

use common::{child_ids, contexts_of, find_by_id, layer_root, started, started_with_feed, FEED_NAMESPACE};
use semtree::dom::Selector;
use semtree::{
    EngineConfig, MutationBatch, MutationRecord, PropertyValue, Target, TargetCondition,
    TreeEvent, MICRODATA_NAMESPACE,
};

const FEED: &str = r#"<html><body>
  <main class="feed">
    <div class="post" data-id="p1" data-author="alice">
      <p>Hello   world</p>
      <div class="south"></div>
      <div class="comment" data-id="c1"><div class="south"></div></div>
    </div>
    <div class="post" data-id="p2" data-author="bob">
      <p>Second</p>
      <div class="south"></div>
    </div>
  </main>
</body></html>"#;

fn element_of(engine: &semtree::Engine, key: semtree::NodeKey) -> semtree::ElementId {
    engine.node(key).and_then(|n| n.element).expect("node is anchored")
}

#[test]
fn scenario_attribute_convention_scope() {
    let engine = started(
        r#"<html><body>
          <div itemscope itemtype="person">
            <span itemprop="name">Alice</span>
            <img itemprop="photo" src="https://example.com/alice.png">
          </div>
        </body></html>"#,
        &EngineConfig::default(),
    );

    let people = contexts_of(&engine, MICRODATA_NAMESPACE, "person");
    assert_eq!(people.len(), 1);
    let person = engine.node(people[0]).unwrap();
    assert_eq!(person.parsed_context.len(), 2);
    assert_eq!(person.property("name"), Some(&PropertyValue::from("Alice")));
    assert_eq!(
        person.property("photo"),
        Some(&PropertyValue::from("https://example.com/alice.png"))
    );
}

#[test]
fn scenario_configured_posts_in_document_order() {
    let engine = started_with_feed(FEED);
    let root = layer_root(&engine, FEED_NAMESPACE);

    assert_eq!(engine.node(root).unwrap().id.as_deref(), Some("global"));
    assert_eq!(
        child_ids(engine.tree(), root),
        vec![Some("p1".to_string()), Some("p2".to_string())]
    );

    let p1 = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    let node = engine.node(p1).unwrap();
    assert_eq!(node.property("text"), Some(&PropertyValue::from("Hello world")));
    assert_eq!(child_ids(engine.tree(), p1), vec![Some("c1".to_string())]);

    // The comment's own anchor is excluded from the post's insertion point.
    let south = node.insertion_point("southPanel").unwrap();
    assert_eq!(engine.document().parent(south), node.element);
}

#[test]
fn scenario_removing_a_post_removes_one_node() {
    let mut engine = started_with_feed(FEED);
    let p1 = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    let p2 = find_by_id(&engine, FEED_NAMESPACE, "p2").unwrap();
    let before = engine.tree().len();
    let p2_element = element_of(&engine, p2);

    let events = engine.apply(|doc| doc.remove(p2_element)).unwrap();

    assert_eq!(engine.tree().len(), before - 1);
    assert!(!engine.is_alive(p2));
    assert!(engine.is_alive(p1));
    assert_eq!(engine.node(p1).unwrap().id.as_deref(), Some("p1"));
    assert_eq!(
        events,
        vec![TreeEvent::ContextsRemoved {
            keys: vec![p2],
            namespace: FEED_NAMESPACE.to_string(),
        }]
    );
}

#[test]
fn scenario_attribute_mutation_flips_the_match() {
    let mut engine = started_with_feed(FEED);
    let target = Target::any()
        .with_context_type("post")
        .with_condition("authorUsername", TargetCondition::eq("alice"));

    let ids = |engine: &semtree::Engine| {
        engine
            .query_all(&target)
            .into_iter()
            .map(|c| c.id.unwrap_or_default())
            .collect::<Vec<_>>()
    };
    assert_eq!(ids(&engine), vec!["p1"]);

    let p1 = element_of(&engine, find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap());
    let p2 = element_of(&engine, find_by_id(&engine, FEED_NAMESPACE, "p2").unwrap());
    engine
        .apply(|doc| {
            doc.set_attribute(p1, "data-author", "carol")?;
            doc.set_attribute(p2, "data-author", "alice")
        })
        .unwrap();

    assert_eq!(ids(&engine), vec!["p2"]);
}

#[test]
fn wholesale_replacement_keeps_identity() {
    let mut engine = started_with_feed(FEED);
    let p1 = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    let c1 = find_by_id(&engine, FEED_NAMESPACE, "c1").unwrap();
    let old = element_of(&engine, p1);
    let parent = engine.document().parent(old).unwrap();

    let mut replacement = None;
    let events = engine
        .apply(|doc| {
            let copy = doc.clone_subtree(old)?;
            replacement = Some(copy);
            doc.replace_child(parent, copy, old)
        })
        .unwrap();

    assert!(events
        .iter()
        .all(|e| matches!(e, TreeEvent::ContextsUpdated { .. })));
    assert!(engine.is_alive(p1) && engine.is_alive(c1));
    assert_eq!(engine.node(p1).unwrap().id.as_deref(), Some("p1"));
    assert_eq!(engine.node(p1).unwrap().element, replacement);
    assert_eq!(engine.node(c1).unwrap().id.as_deref(), Some("c1"));
    assert!(engine.document().contains(replacement.unwrap(), element_of(&engine, c1)));
}

#[test]
fn replacement_by_another_entity_gets_a_new_node() {
    let mut engine = started(
        r#"<html><body>
          <article itemscope itemtype="post" itemid="a"><span itemprop="text">A</span></article>
        </body></html>"#,
        &EngineConfig::default(),
    );
    let a = find_by_id(&engine, MICRODATA_NAMESPACE, "a").unwrap();
    let old = element_of(&engine, a);
    let body = engine.document().body();

    let events = engine
        .apply(|doc| {
            let article = doc.create_element("article");
            doc.set_attribute(article, "itemscope", "")?;
            doc.set_attribute(article, "itemtype", "post")?;
            doc.set_attribute(article, "itemid", "b")?;
            let text = doc.create_element("span");
            doc.set_attribute(text, "itemprop", "text")?;
            doc.set_text(text, "B")?;
            doc.append_child(article, text)?;
            doc.replace_child(body, article, old)
        })
        .unwrap();

    assert!(!engine.is_alive(a));
    assert!(find_by_id(&engine, MICRODATA_NAMESPACE, "a").is_none());
    let b = find_by_id(&engine, MICRODATA_NAMESPACE, "b").unwrap();
    assert_eq!(engine.node(b).unwrap().property("text"), Some(&PropertyValue::from("B")));
    assert!(events.contains(&TreeEvent::ContextsRemoved {
        keys: vec![a],
        namespace: MICRODATA_NAMESPACE.to_string(),
    }));
    assert!(events.contains(&TreeEvent::ContextsAdded {
        keys: vec![b],
        namespace: MICRODATA_NAMESPACE.to_string(),
    }));
}

#[test]
fn inserted_post_is_added_in_order() {
    let mut engine = started_with_feed(FEED);
    let root = layer_root(&engine, FEED_NAMESPACE);
    let p2 = element_of(&engine, find_by_id(&engine, FEED_NAMESPACE, "p2").unwrap());
    let feed = engine.document().parent(p2).unwrap();

    let events = engine
        .apply(|doc| {
            let post = doc.create_element("div");
            doc.set_attribute(post, "class", "post")?;
            doc.set_attribute(post, "data-id", "p3")?;
            doc.insert_before(feed, post, Some(p2))
        })
        .unwrap();

    let p3 = find_by_id(&engine, FEED_NAMESPACE, "p3").unwrap();
    assert_eq!(
        events,
        vec![TreeEvent::ContextsAdded {
            keys: vec![p3],
            namespace: FEED_NAMESPACE.to_string(),
        }]
    );
    assert_eq!(
        child_ids(engine.tree(), root),
        vec![
            Some("p1".to_string()),
            Some("p3".to_string()),
            Some("p2".to_string())
        ]
    );
}

#[test]
fn reparse_without_change_is_idempotent() {
    let mut engine = started_with_feed(FEED);
    let before = engine.get_context_tree();
    let p1 = element_of(&engine, find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap());

    let batch = MutationBatch::new(vec![
        MutationRecord::Attributes {
            target: p1,
            name: "class".to_string(),
            old_value: Some("post".to_string()),
        },
        MutationRecord::ChildList {
            target: p1,
            added: vec![],
            removed: vec![],
        },
    ]);
    let events = engine.ingest(&batch).unwrap();

    assert!(events.is_empty());
    assert_eq!(engine.get_context_tree(), before);
}

#[test]
fn losing_recognition_destroys_the_subtree() {
    let mut engine = started_with_feed(FEED);
    let p1 = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    let c1 = find_by_id(&engine, FEED_NAMESPACE, "c1").unwrap();
    let element = element_of(&engine, p1);

    let events = engine
        .apply(|doc| doc.set_attribute(element, "class", "ad"))
        .unwrap();

    assert!(!engine.is_alive(p1));
    assert!(!engine.is_alive(c1));
    let removed: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, TreeEvent::ContextsRemoved { .. }))
        .flat_map(|e| e.keys().to_vec())
        .collect();
    assert_eq!(removed, vec![p1, c1]);
}

#[test]
fn records_for_detached_elements_are_ignored() {
    let mut engine = started_with_feed(FEED);
    let before = engine.get_context_tree();

    let events = engine
        .apply(|doc| {
            let orphan = doc.create_element("div");
            doc.set_attribute(orphan, "class", "post")?;
            doc.set_attribute(orphan, "itemtype", "post")
        })
        .unwrap();

    assert!(events.is_empty());
    assert_eq!(engine.get_context_tree(), before);
}

#[test]
fn restart_rebuilds_the_same_tree() {
    let mut engine = started_with_feed(FEED);
    let before = engine.get_context_tree();

    let removed = engine.stop().unwrap();
    assert!(!removed.is_empty());
    assert_eq!(engine.get_context_tree().count(), 1);
    // A second stop is a no-op.
    assert!(engine.stop().unwrap().is_empty());

    // Batches are ignored while stopped.
    let p = Selector::parse(".post")
        .unwrap()
        .query_first(engine.document(), engine.document().root())
        .unwrap();
    assert!(engine
        .apply(|doc| doc.set_attribute(p, "data-author", "dave"))
        .unwrap()
        .is_empty());

    engine.start().unwrap();
    let after = engine.get_context_tree();
    assert_eq!(after.count(), before.count());
    let p1 = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    assert_eq!(
        engine.node(p1).unwrap().property("authorUsername"),
        Some(&PropertyValue::from("dave"))
    );
}

#[test]
fn hidden_contexts_are_not_visible() {
    let mut engine = started_with_feed(FEED);
    let p1 = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    let c1 = find_by_id(&engine, FEED_NAMESPACE, "c1").unwrap();
    let element = element_of(&engine, p1);
    assert!(engine.is_visible(c1));

    engine
        .apply(|doc| doc.set_attribute(element, "style", "display: none"))
        .unwrap();
    assert!(engine.is_alive(c1));
    assert!(!engine.is_visible(c1));
}

#[test]
fn layers_coexist_on_one_element() {
    let engine = started_with_feed(
        r#"<html><body>
          <div class="post" data-id="p1" itemscope itemtype="post" itemid="md-1"></div>
        </body></html>"#,
    );
    let configured = find_by_id(&engine, FEED_NAMESPACE, "p1").unwrap();
    let microdata = find_by_id(&engine, MICRODATA_NAMESPACE, "md-1").unwrap();
    assert_ne!(configured, microdata);
    assert_eq!(element_of(&engine, configured), element_of(&engine, microdata));
    assert_eq!(engine.query_all(&Target::any().with_context_type("post")).len(), 2);
}
