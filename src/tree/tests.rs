//! Serialization tests with snapshot-contract fixtures

use serde_json::{json, Value};

/// Contract fixture: a snapshot as consumed across the isolation boundary
fn snapshot_fixture() -> Value {
    json!({
        "namespace": "https://semtree.dev/ns/microdata",
        "contextType": "post",
        "id": "post-1",
        "parsedContext": {
            "authorUsername": "alice",
            "likes": 3.0,
            "pinned": false,
            "deletedAt": null
        },
        "children": [
            {
                "namespace": "https://semtree.dev/ns/microdata",
                "contextType": "comment",
                "id": null,
                "parsedContext": {},
                "children": []
            }
        ]
    })
}

#[cfg(test)]
mod serialization_tests {
    use super::*;
    use crate::tree::{ContextNode, ContextTree, PropertyValue, TransferableContext};

    #[test]
    fn snapshot_deserializes_from_contract_fixture() {
        let snapshot: TransferableContext = serde_json::from_value(snapshot_fixture()).unwrap();
        assert_eq!(snapshot.context_type, "post");
        assert_eq!(
            snapshot.parsed_context.get("authorUsername"),
            Some(&PropertyValue::String("alice".to_string()))
        );
        assert_eq!(
            snapshot.parsed_context.get("likes"),
            Some(&PropertyValue::Number(3.0))
        );
        assert_eq!(
            snapshot.parsed_context.get("pinned"),
            Some(&PropertyValue::Bool(false))
        );
        assert_eq!(
            snapshot.parsed_context.get("deletedAt"),
            Some(&PropertyValue::Null)
        );
        assert_eq!(snapshot.children[0].id, None);
    }

    #[test]
    fn snapshot_roundtrips_to_the_same_json() {
        let snapshot: TransferableContext = serde_json::from_value(snapshot_fixture()).unwrap();
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json, snapshot_fixture());
    }

    #[test]
    fn tree_snapshot_uses_camel_case_and_omits_live_references() {
        let mut tree = ContextTree::new();
        let root = tree.root();
        tree.insert(
            root,
            None,
            ContextNode::new("ns", "profile")
                .with_id("bob")
                .with_property("fullName", "Bob"),
        )
        .unwrap();

        let json = serde_json::to_value(tree.snapshot(root).unwrap()).unwrap();
        let profile = &json["children"][0];
        assert_eq!(profile["contextType"], "profile");
        assert_eq!(profile["parsedContext"]["fullName"], "Bob");
        assert!(profile.get("element").is_none());
        assert!(profile.get("parent").is_none());
    }

    #[test]
    fn property_value_serializes_untagged() {
        let json = serde_json::to_string(&PropertyValue::from("x")).unwrap();
        assert_eq!(json, "\"x\"");
        let json = serde_json::to_string(&PropertyValue::Null).unwrap();
        assert_eq!(json, "null");
    }
}
