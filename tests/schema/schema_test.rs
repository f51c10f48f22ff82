use abacus::error::CubeError;
use abacus::model::CubeModel;
use abacus::schema::SchemaBinding;
use abacus::sql::Dialect;
use abacus::store::{MemoryStore, StorageExecutor};
use abacus::Cube;
use serde_json::{json, Value};

fn description() -> Value {
    json!({
        "dataset": {"name": "cra", "currency": "GBP", "default_time": "time"},
        "mapping": {
            "amount": {"type": "measure"},
            "region": {"type": "value"},
            "time": {"type": "date"},
            "to": {"type": "compound", "attributes": {"label": {}}}
        }
    })
}

fn binding() -> SchemaBinding {
    SchemaBinding::bind(&CubeModel::from_value(&description()).unwrap())
}

#[test]
fn test_physical_names_use_dataset_prefix() {
    let b = binding();
    assert_eq!(b.fact_table().name, "cra__entry");
    let names: Vec<&str> = b.tables().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["cra__time", "cra__to", "cra__entry"]);
}

#[test]
fn test_create_plan_sql_renders_for_both_dialects() {
    let plan = binding().create_plan();
    let fact = plan.last().unwrap();
    let pg = fact.to_sql(Dialect::Postgres);
    assert!(pg.contains("CREATE TABLE IF NOT EXISTS \"cra__entry\""));
    assert!(pg.contains("\"id\" CHAR(64) NOT NULL PRIMARY KEY"));
    assert!(pg.contains("FOREIGN KEY (\"time_id\") REFERENCES \"cra__time\" (\"id\")"));
    let duck = fact.to_sql(Dialect::DuckDb);
    assert!(duck.contains("\"id\" VARCHAR NOT NULL PRIMARY KEY"));
}

#[test]
fn test_generate_is_idempotent() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.init().unwrap();
    assert!(!cube.is_generated());
    cube.generate().unwrap();
    assert!(cube.is_generated());
    assert!(cube.store().table_exists("cra__entry").unwrap());
    assert!(cube.store().table_exists("cra__to").unwrap());
    // Second call is a no-op, not an error.
    cube.generate().unwrap();
}

#[test]
fn test_init_recognizes_existing_schema() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    cube.load(&json!({
        "amount": 10,
        "region": "North",
        "time": {"year": 2020},
        "to": {"label": "Health"}
    }))
    .unwrap();

    // A fresh cube over the same store starts out Generated after init.
    let store = cube.store().clone();
    let mut reopened = Cube::new(&description(), store).unwrap();
    reopened.init().unwrap();
    assert!(reopened.is_generated());
    assert_eq!(reopened.len().unwrap(), 1);
}

#[test]
fn test_drop_then_generate_restores_empty_schema() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    cube.load(&json!({
        "amount": 10,
        "region": "North",
        "time": {"year": 2020},
        "to": {"label": "Health"}
    }))
    .unwrap();
    assert_eq!(cube.len().unwrap(), 1);

    cube.drop().unwrap();
    assert!(!cube.is_generated());
    assert!(!cube.store().table_exists("cra__entry").unwrap());
    assert_eq!(cube.len().unwrap(), 0);

    cube.generate().unwrap();
    assert!(cube.is_generated());
    assert_eq!(cube.len().unwrap(), 0);
    let result = cube
        .aggregate(&abacus::AggregateRequest::new())
        .unwrap();
    assert_eq!(result.summary.num_entries, 0);
}

#[test]
fn test_flush_keeps_structure() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    cube.load(&json!({
        "amount": 10,
        "region": "North",
        "time": {"year": 2020},
        "to": {"label": "Health"}
    }))
    .unwrap();
    cube.flush().unwrap();
    assert!(cube.is_generated());
    assert_eq!(cube.len().unwrap(), 0);
    assert!(cube.store().table_exists("cra__to").unwrap());
}

#[test]
fn test_incompatible_existing_table_is_a_schema_conflict() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();

    // Same dataset name, different field set.
    let other = json!({
        "dataset": {"name": "cra"},
        "mapping": {
            "amount": {"type": "measure"},
            "payee": {"type": "value"}
        }
    });
    let mut conflicting = Cube::new(&other, cube.store().clone()).unwrap();
    let err = conflicting.generate().unwrap_err();
    assert!(matches!(err, CubeError::SchemaConflict { .. }));
}
