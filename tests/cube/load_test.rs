use abacus::error::CubeError;
use abacus::sql::{col, ExprExt, Query, TableRef};
use abacus::store::{MemoryStore, StorageExecutor};
use abacus::Cube;
use serde_json::{json, Value};

fn description() -> Value {
    json!({
        "dataset": {"name": "cra", "currency": "GBP", "default_time": "time"},
        "mapping": {
            "amount": {"type": "measure"},
            "time": {"type": "date"},
            "to": {"type": "compound", "attributes": {"label": {}}}
        }
    })
}

fn generated_cube() -> Cube<MemoryStore> {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    cube
}

fn health_record(amount: f64) -> Value {
    json!({
        "amount": amount,
        "time": {"year": 2020},
        "to": {"label": "Health"}
    })
}

fn table_rows(cube: &Cube<MemoryStore>, table: &str) -> usize {
    let query = Query::new()
        .select(vec![col("id")])
        .from(TableRef::new(table));
    cube.store().fetch(&query).unwrap().len()
}

#[test]
fn test_load_requires_generated_schema() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.init().unwrap();
    let err = cube.load(&health_record(100.0)).unwrap_err();
    assert!(matches!(err, CubeError::NotGenerated(name) if name == "cra"));
}

#[test]
fn test_fact_id_is_key_order_independent() {
    let mut cube = generated_cube();
    let r1: Value = serde_json::from_str(
        r#"{"amount": 100, "time": {"year": 2020}, "to": {"label": "Health"}}"#,
    )
    .unwrap();
    let r2: Value = serde_json::from_str(
        r#"{"to": {"label": "Health"}, "time": {"year": 2020}, "amount": 100}"#,
    )
    .unwrap();
    let id1 = cube.load(&r1).unwrap();
    let id2 = cube.load(&r2).unwrap();
    assert_eq!(id1, id2);
    assert_eq!(cube.len().unwrap(), 1);
}

#[test]
fn test_reloading_is_idempotent() {
    let mut cube = generated_cube();
    let record = health_record(100.0);
    let first = cube.load(&record).unwrap();
    let second = cube.load(&record).unwrap();
    assert_eq!(first, second);
    assert_eq!(cube.len().unwrap(), 1);
    assert_eq!(table_rows(&cube, "cra__to"), 1);
    assert_eq!(table_rows(&cube, "cra__time"), 1);
}

#[test]
fn test_shared_members_are_deduplicated() {
    let mut cube = generated_cube();
    cube.load(&health_record(100.0)).unwrap();
    cube.load(&health_record(50.0)).unwrap();
    assert_eq!(cube.len().unwrap(), 2);
    // Both entries point at the same "Health" member and the same date.
    assert_eq!(table_rows(&cube, "cra__to"), 1);
    assert_eq!(table_rows(&cube, "cra__time"), 1);
}

#[test]
fn test_distinct_members_create_rows() {
    let mut cube = generated_cube();
    cube.load(&health_record(100.0)).unwrap();
    cube.load(&json!({
        "amount": 25,
        "time": {"year": 2021},
        "to": {"label": "Defence"}
    }))
    .unwrap();
    assert_eq!(table_rows(&cube, "cra__to"), 2);
    assert_eq!(table_rows(&cube, "cra__time"), 2);
}

#[test]
fn test_missing_field_is_a_load_error() {
    let mut cube = generated_cube();
    let err = cube
        .load(&json!({"time": {"year": 2020}, "to": {"label": "Health"}}))
        .unwrap_err();
    match err {
        CubeError::Load { field, .. } => assert_eq!(field, "amount"),
        other => panic!("expected a load error, got {other:?}"),
    }
    // The record was rejected before any fact row was written.
    assert_eq!(cube.len().unwrap(), 0);
}

#[test]
fn test_non_numeric_measure_is_a_load_error() {
    let mut cube = generated_cube();
    let err = cube
        .load(&json!({
            "amount": "lots",
            "time": {"year": 2020},
            "to": {"label": "Health"}
        }))
        .unwrap_err();
    assert!(matches!(err, CubeError::Load { field, .. } if field == "amount"));
}

#[test]
fn test_failed_record_does_not_corrupt_committed_rows() {
    let mut cube = generated_cube();
    cube.load(&health_record(100.0)).unwrap();
    let _ = cube
        .load(&json!({"amount": "bad", "time": {"year": 2020}, "to": {"label": "Health"}}))
        .unwrap_err();
    assert_eq!(cube.len().unwrap(), 1);
    let total = cube
        .aggregate(&abacus::AggregateRequest::new())
        .unwrap();
    assert_eq!(total.summary.value, 100.0);
}

#[test]
fn test_measure_strings_are_parsed() {
    let mut cube = generated_cube();
    cube.load(&json!({
        "amount": "12.5",
        "time": {"year": 2020},
        "to": {"label": "Health"}
    }))
    .unwrap();
    let result = cube.aggregate(&abacus::AggregateRequest::new()).unwrap();
    assert_eq!(result.summary.value, 12.5);
}
