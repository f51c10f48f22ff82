use abacus::hash::{content_hash, member_hash, CONTENT_HASH_VERSION};
use serde_json::{json, Value};

#[test]
fn test_algorithm_version_is_pinned() {
    assert_eq!(CONTENT_HASH_VERSION, 1);
}

#[test]
fn test_hash_shape() {
    let hash = content_hash(&json!({"amount": 100}));
    assert_eq!(hash.len(), 64);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
}

#[test]
fn test_key_order_does_not_matter() {
    let a: Value = serde_json::from_str(
        r#"{"amount": 100, "time": {"year": 2020}, "to": {"label": "Health"}}"#,
    )
    .unwrap();
    let b: Value = serde_json::from_str(
        r#"{"to": {"label": "Health"}, "amount": 100, "time": {"year": 2020}}"#,
    )
    .unwrap();
    assert_eq!(content_hash(&a), content_hash(&b));
}

#[test]
fn test_nested_key_order_does_not_matter() {
    let a: Value =
        serde_json::from_str(r#"{"to": {"label": "Health", "name": "health"}}"#).unwrap();
    let b: Value =
        serde_json::from_str(r#"{"to": {"name": "health", "label": "Health"}}"#).unwrap();
    assert_eq!(content_hash(&a), content_hash(&b));
}

#[test]
fn test_content_changes_change_the_hash() {
    assert_ne!(
        content_hash(&json!({"amount": 100})),
        content_hash(&json!({"amount": 100.5}))
    );
    assert_ne!(
        content_hash(&json!({"amount": 100})),
        content_hash(&json!({"amounts": 100}))
    );
}

#[test]
fn test_member_hash_is_pair_order_independent_via_sorting() {
    let label = json!("Health");
    let name = json!("health");
    let forward = member_hash(vec![("label", &label), ("name", &name)]);
    let reversed = member_hash(vec![("name", &name), ("label", &label)]);
    assert_eq!(forward, reversed);
    assert_eq!(
        forward,
        content_hash(&json!({"label": "Health", "name": "health"}))
    );
}
