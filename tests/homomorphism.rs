//! Structural homomorphism under random edits
//!
//! After every batch, each adapter layer must mirror its recognized
//! elements: one node per element, parented by the nearest recognized
//! ancestor, siblings in document order.

mod common;

use common::{assert_homomorphic, layer_root, started};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use semtree::dom::Document;
use semtree::{ElementId, Engine, EngineConfig, ParserConfig, MICRODATA_NAMESPACE, WIDGET_NAMESPACE};

const SEEDS: u64 = 24;
const STEPS: usize = 40;
const TYPES: &[&str] = &["feed", "post", "comment"];
const CLASSES: &[&str] = &["post", "comment"];
const THREADS_NAMESPACE: &str = "https://semtree.dev/ns/parser/example.near/parser/threads";

const START: &str = r#"<html><body>
  <div itemscope itemtype="feed">
    <article itemscope itemtype="post" itemid="p1" class="post" data-id="t1">
      <span itemprop="text">a</span>
      <div class="south"></div>
    </article>
    <section>
      <article itemscope itemtype="post" itemid="p2">
        <div itemscope itemtype="comment" class="comment" data-id="t2">
          <div class="south"></div>
        </div>
      </article>
    </section>
  </div>
  <div class="post" data-id="t3"><p><span class="comment"></span></p></div>
  <bos-component data-context-scope="" data-context-type="panel">
    <div><bos-component data-context-scope="" data-context-type="button"></bos-component></div>
  </bos-component>
</body></html>"#;

fn is_item(doc: &Document, id: ElementId) -> bool {
    doc.has_attribute(id, "itemtype")
}

fn is_threaded(doc: &Document, id: ElementId) -> bool {
    doc.attribute(id, "class").is_some_and(|class| CLASSES.contains(&class))
}

/// Posts and comments nest under each other at any depth, so recognition
/// depends only on an element's own class.
fn threads_config() -> ParserConfig {
    ParserConfig::from_yaml(
        r#"
namespace: example.near/parser/threads
contexts:
  root:
    children: [post, comment]
  post:
    selector: ".post"
    props:
      id: "string(@data-id)"
    insertionPoints:
      south: ".south"
    children: [post, comment]
  comment:
    selector: ".comment"
    props:
      id: "string(@data-id)"
    insertionPoints:
      south: ".south"
    children: [post, comment]
"#,
    )
    .expect("threads config parses")
}

fn config() -> EngineConfig {
    EngineConfig::default().with_parser_config(threads_config())
}

fn is_widget(doc: &Document, id: ElementId) -> bool {
    doc.tag(id) == Some("bos-component")
        && doc.has_attribute(id, "data-context-scope")
        && doc.has_attribute(id, "data-context-type")
}

fn check(engine: &Engine) {
    let observed = engine.document().body();
    assert_homomorphic(
        engine.document(),
        engine.tree(),
        layer_root(engine, MICRODATA_NAMESPACE),
        observed,
        is_item,
    );
    assert_homomorphic(
        engine.document(),
        engine.tree(),
        layer_root(engine, WIDGET_NAMESPACE),
        observed,
        is_widget,
    );
    assert_homomorphic(
        engine.document(),
        engine.tree(),
        layer_root(engine, THREADS_NAMESPACE),
        observed,
        is_threaded,
    );
}

/// One random edit. Recognized scopes always carry both `itemscope` and
/// `itemtype`, so scope boundaries and recognition coincide. Threaded
/// elements carry exactly one of [`CLASSES`].
fn random_edit(rng: &mut StdRng, doc: &mut Document) -> semtree::dom::DomResult<()> {
    let body = doc.body();
    let attached = doc.descendants(body);
    let mut anywhere = attached.clone();
    anywhere.push(body);
    let Some(&parent) = anywhere.choose(rng) else {
        return Ok(());
    };

    match rng.gen_range(0..8) {
        // Insert a fresh element, recognized by one layer or by none.
        0 | 1 => {
            let element = match rng.gen_range(0..4) {
                0 => {
                    let el = doc.create_element("div");
                    doc.set_attribute(el, "itemscope", "")?;
                    doc.set_attribute(el, "itemtype", *TYPES.choose(rng).unwrap_or(&"post"))?;
                    el
                }
                1 => {
                    let el = doc.create_element("bos-component");
                    doc.set_attribute(el, "data-context-scope", "")?;
                    doc.set_attribute(el, "data-context-type", *TYPES.choose(rng).unwrap_or(&"post"))?;
                    el
                }
                2 => {
                    let el = doc.create_element("div");
                    doc.set_attribute(el, "class", *CLASSES.choose(rng).unwrap_or(&"post"))?;
                    el
                }
                _ => doc.create_element("span"),
            };
            let siblings = doc.element_children(parent);
            let reference = siblings.choose(rng).copied();
            doc.insert_before(parent, element, reference)
        }
        // Remove a subtree.
        2 => match attached.choose(rng) {
            Some(&victim) => doc.remove(victim),
            None => Ok(()),
        },
        // Move a subtree somewhere outside itself.
        3 => {
            let Some(&moved) = attached.choose(rng) else {
                return Ok(());
            };
            let targets: Vec<ElementId> = anywhere
                .iter()
                .copied()
                .filter(|t| !doc.contains(moved, *t))
                .collect();
            match targets.choose(rng) {
                Some(&target) => doc.append_child(target, moved),
                None => Ok(()),
            }
        }
        // Re-render: replace a subtree with a deep copy.
        4 => {
            let Some(&old) = attached.choose(rng) else {
                return Ok(());
            };
            let Some(old_parent) = doc.parent(old) else {
                return Ok(());
            };
            let copy = doc.clone_subtree(old)?;
            doc.replace_child(old_parent, copy, old)
        }
        // Toggle microdata recognition.
        5 => {
            let Some(&el) = attached.choose(rng) else {
                return Ok(());
            };
            if doc.has_attribute(el, "itemtype") {
                doc.remove_attribute(el, "itemtype")?;
                doc.remove_attribute(el, "itemscope")?;
            } else {
                doc.set_attribute(el, "itemscope", "")?;
                doc.set_attribute(el, "itemtype", *TYPES.choose(rng).unwrap_or(&"post"))?;
            }
            Ok(())
        }
        // Toggle or swap a threaded class.
        6 => {
            let Some(&el) = attached.choose(rng) else {
                return Ok(());
            };
            let class = doc.attribute(el, "class").map(str::to_string);
            match class.as_deref() {
                Some("post") if rng.gen_bool(0.5) => doc.set_attribute(el, "class", "comment"),
                Some("comment") if rng.gen_bool(0.5) => doc.set_attribute(el, "class", "post"),
                Some("post" | "comment") => doc.remove_attribute(el, "class").map(|_| ()),
                _ => doc.set_attribute(el, "class", *CLASSES.choose(rng).unwrap_or(&"post")),
            }
        }
        // Retype a widget.
        _ => {
            let widgets: Vec<ElementId> = attached.iter().copied().filter(|e| is_widget(doc, *e)).collect();
            match widgets.choose(rng) {
                Some(&el) => doc.set_attribute(el, "data-context-type", *TYPES.choose(rng).unwrap_or(&"post")),
                None => Ok(()),
            }
        }
    }
}

#[test]
fn layers_mirror_the_document_under_random_edits() {
    for seed in 0..SEEDS {
        let mut engine = started(START, &config());
        check(&engine);

        let mut rng = StdRng::seed_from_u64(seed);
        for step in 0..STEPS {
            let edits = rng.gen_range(1..4);
            let mut edit_rng = StdRng::seed_from_u64(rng.gen());
            engine
                .apply(|doc| {
                    for _ in 0..edits {
                        random_edit(&mut edit_rng, doc)?;
                    }
                    Ok(())
                })
                .unwrap_or_else(|e| panic!("seed {seed} step {step}: {e}"));
            check(&engine);
        }
    }
}

#[test]
fn batches_of_edits_match_a_fresh_scan() {
    for seed in 0..SEEDS {
        let mut engine = started(START, &config());
        let mut rng = StdRng::seed_from_u64(seed ^ 0x5eed);
        for _ in 0..STEPS {
            let mut edit_rng = StdRng::seed_from_u64(rng.gen());
            engine
                .apply(|doc| random_edit(&mut edit_rng, doc))
                .unwrap();
        }

        let incremental = engine.get_context_tree();
        engine.stop().unwrap();
        engine.start().unwrap();
        assert_eq!(engine.get_context_tree(), incremental, "seed {seed}");
    }
}
