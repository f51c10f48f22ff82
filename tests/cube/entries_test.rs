use abacus::error::CubeError;
use abacus::store::MemoryStore;
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

fn loaded_cube() -> Cube<MemoryStore> {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    for (amount, label) in [(100.0, "Health"), (50.0, "Defence"), (25.0, "Education")] {
        cube.load(&json!({
            "amount": amount,
            "region": "North",
            "time": {"year": 2020},
            "to": {"label": label}
        }))
        .unwrap();
    }
    cube
}

fn collect(cube: &Cube<MemoryStore>, limit: Option<u64>, offset: u64) -> Vec<Value> {
    cube.entries(limit, offset)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn test_entries_are_denormalized() {
    let cube = loaded_cube();
    let entries = collect(&cube, None, 0);
    assert_eq!(entries.len(), 3);

    for entry in &entries {
        // Compound dimensions come back as nested attribute mappings.
        assert!(entry["to"]["label"].is_string());
        assert_eq!(entry["time"]["date"], json!("2020-01-01"));
        assert!(entry["amount"].is_number());
        assert_eq!(entry["region"], json!("North"));
        assert_eq!(entry["id"].as_str().unwrap().len(), 64);
    }

    let labels: Vec<&str> = entries
        .iter()
        .map(|e| e["to"]["label"].as_str().unwrap())
        .collect();
    assert!(labels.contains(&"Health"));
    assert!(labels.contains(&"Defence"));
    assert!(labels.contains(&"Education"));
}

#[test]
fn test_entries_restartable() {
    let cube = loaded_cube();
    let first = collect(&cube, None, 0);
    let second = collect(&cube, None, 0);
    assert_eq!(first, second);
}

#[test]
fn test_entries_limit_offset() {
    let cube = loaded_cube();
    let all = collect(&cube, None, 0);
    let head = collect(&cube, Some(2), 0);
    let tail = collect(&cube, None, 2);
    assert_eq!(head.len(), 2);
    assert_eq!(tail.len(), 1);
    assert_eq!(head[0], all[0]);
    assert_eq!(head[1], all[1]);
    assert_eq!(tail[0], all[2]);
}

#[test]
fn test_entries_empty_cube() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    assert!(collect(&cube, None, 0).is_empty());
}

#[test]
fn test_entries_require_generated_schema() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.init().unwrap();
    assert!(matches!(
        cube.entries(None, 0).err(),
        Some(CubeError::NotGenerated(_))
    ));
}
