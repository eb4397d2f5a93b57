// tests/property_tests.rs
// Property tests for the document layer

use std::collections::BTreeMap;

use proptest::prelude::*;
use quillbase_core::{Document, DocumentPtr, ErrorCode, ScalarValue};

fn scalar() -> impl Strategy<Value = ScalarValue> {
    prop_oneof![
        any::<bool>().prop_map(ScalarValue::Bool),
        any::<i64>().prop_map(ScalarValue::Int),
        (-1.0e12f64..1.0e12).prop_map(ScalarValue::Float),
        "[a-zA-Z0-9 ]{0,16}".prop_map(ScalarValue::String),
        Just(ScalarValue::Null),
    ]
}

fn key() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9]{0,7}"
}

fn flat_fields() -> impl Strategy<Value = BTreeMap<String, ScalarValue>> {
    prop::collection::btree_map(key(), scalar(), 1..8)
}

fn doc_from_fields(fields: &BTreeMap<String, ScalarValue>) -> DocumentPtr {
    let doc = Document::new();
    for (k, v) in fields {
        assert_eq!(doc.set(&format!("/{}", k), v.clone()), ErrorCode::Success);
    }
    doc
}

proptest! {
    #[test]
    fn set_then_get_returns_the_value(k in key(), v in scalar()) {
        let doc = Document::new();
        let pointer = format!("/{}", k);
        prop_assert_eq!(doc.set(&pointer, v.clone()), ErrorCode::Success);
        prop_assert!(doc.is_exists(&pointer));
        prop_assert_eq!(doc.get_value(&pointer), Some(v));
    }

    #[test]
    fn set_then_remove_leaves_nothing(k in key(), v in scalar()) {
        let doc = Document::new();
        let pointer = format!("/{}", k);
        doc.set(&pointer, v);
        prop_assert_eq!(doc.remove(&pointer), ErrorCode::Success);
        prop_assert!(!doc.is_exists(&pointer));
        prop_assert_eq!(doc.remove(&pointer), ErrorCode::NoSuchElement);
    }

    #[test]
    fn json_roundtrip_is_identity(fields in flat_fields()) {
        let doc = doc_from_fields(&fields);
        let text = doc.to_json();
        let back = Document::from_json(&text).unwrap();
        // logical types may narrow across the trip, so compare values
        for (k, v) in &fields {
            let pointer = format!("/{}", k);
            prop_assert_eq!(back.get_value(&pointer), Some(v.clone()));
        }
        prop_assert_eq!(back.count(""), fields.len());
    }

    #[test]
    fn merge_is_idempotent_on_overlap(a in flat_fields(), b in flat_fields()) {
        let doc_a = doc_from_fields(&a);
        let doc_b = doc_from_fields(&b);
        let once = Document::merge(&doc_a, &doc_b);
        let twice = Document::merge(&once, &doc_b);
        prop_assert!(Document::is_equals_documents(&once, &twice));
    }

    #[test]
    fn merge_prefers_right_side(a in flat_fields(), b in flat_fields()) {
        let doc_a = doc_from_fields(&a);
        let doc_b = doc_from_fields(&b);
        let merged = Document::merge(&doc_a, &doc_b);
        for (k, v) in &b {
            prop_assert_eq!(merged.get_value(&format!("/{}", k)), Some(v.clone()));
        }
        for (k, v) in &a {
            if !b.contains_key(k) {
                prop_assert_eq!(merged.get_value(&format!("/{}", k)), Some(v.clone()));
            }
        }
    }

    #[test]
    fn move_swaps_existence(v in scalar()) {
        let doc = Document::new();
        doc.set("/from", v.clone());
        prop_assert_eq!(doc.move_to("/from", "/to"), ErrorCode::Success);
        prop_assert!(!doc.is_exists("/from"));
        prop_assert_eq!(doc.get_value("/to"), Some(v));
    }

    #[test]
    fn copy_makes_equal_subtrees(v in scalar()) {
        let doc = Document::new();
        doc.set("/src", v);
        prop_assert_eq!(doc.copy_to("/src", "/dst"), ErrorCode::Success);
        prop_assert_eq!(doc.compare("/src", &doc, "/dst"), std::cmp::Ordering::Equal);
    }

    #[test]
    fn compare_is_antisymmetric(x in scalar(), y in scalar()) {
        let a = Document::new();
        a.set("/v", x);
        let b = Document::new();
        b.set("/v", y);
        let forward = a.compare("/v", &b, "/v");
        let backward = b.compare("/v", &a, "/v");
        prop_assert_eq!(forward, backward.reverse());
    }

    #[test]
    fn typed_is_implies_get(k in key(), v in any::<i64>()) {
        let doc = Document::new();
        let pointer = format!("/{}", k);
        doc.set(&pointer, v);
        if doc.is_long(&pointer) {
            prop_assert_eq!(doc.get_long(&pointer), Some(v));
        }
        if doc.is_int(&pointer) {
            prop_assert_eq!(doc.get_int(&pointer).map(i64::from), Some(v));
        }
    }
}
