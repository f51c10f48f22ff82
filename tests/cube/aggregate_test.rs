use abacus::error::CubeError;
use abacus::store::MemoryStore;
use abacus::{AggregateRequest, Cube};
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

fn record(amount: f64, year: i64, label: &str, region: &str) -> Value {
    json!({
        "amount": amount,
        "region": region,
        "time": {"year": year},
        "to": {"label": label}
    })
}

fn loaded_cube(records: &[Value]) -> Cube<MemoryStore> {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.generate().unwrap();
    for record in records {
        cube.load(record).unwrap();
    }
    cube
}

fn health_cube() -> Cube<MemoryStore> {
    loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(50.0, 2020, "Health", "North"),
    ])
}

#[test]
fn test_health_scenario() {
    let cube = health_cube();
    let result = cube
        .aggregate(&AggregateRequest::new().drilldown("to"))
        .unwrap();

    assert_eq!(result.summary.value, 150.0);
    assert_eq!(result.summary.num_entries, 2);
    assert_eq!(result.summary.currency.as_deref(), Some("GBP"));
    assert_eq!(result.summary.num_drilldowns, 1);

    assert_eq!(result.drilldown.len(), 1);
    let row = &result.drilldown[0];
    assert_eq!(row["amount"], json!(150.0));
    assert_eq!(row["num_entries"], json!(2));
    assert_eq!(row["to"]["label"], json!("Health"));
}

#[test]
fn test_empty_drilldowns_equal_summary() {
    let cube = health_cube();
    let result = cube.aggregate(&AggregateRequest::new()).unwrap();
    assert_eq!(result.summary.num_drilldowns, 1);
    assert_eq!(result.drilldown.len(), 1);
    let row = &result.drilldown[0];
    assert_eq!(row["amount"], json!(result.summary.value));
    assert_eq!(row["num_entries"], json!(result.summary.num_entries));
}

#[test]
fn test_composite_drilldown() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(25.0, 2020, "Defence", "South"),
    ]);
    let result = cube
        .aggregate(&AggregateRequest::new().drilldown("to.label"))
        .unwrap();
    assert_eq!(result.summary.num_drilldowns, 2);
    // Default ordering: measure, descending.
    assert_eq!(result.drilldown[0]["to"]["label"], json!("Health"));
    assert_eq!(result.drilldown[0]["amount"], json!(100.0));
    assert_eq!(result.drilldown[1]["to"]["label"], json!("Defence"));
}

#[test]
fn test_year_drilldown_uses_derived_label() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(50.0, 2020, "Health", "North"),
        record(25.0, 2021, "Health", "North"),
    ]);
    let result = cube
        .aggregate(&AggregateRequest::new().drilldown("year"))
        .unwrap();
    assert_eq!(result.summary.num_drilldowns, 2);
    assert_eq!(result.drilldown[0]["time"]["year"], json!("2020"));
    assert_eq!(result.drilldown[0]["amount"], json!(150.0));
    assert_eq!(result.drilldown[1]["time"]["year"], json!("2021"));
}

#[test]
fn test_yearmonth_drilldown() {
    let cube = loaded_cube(&[
        record(10.0, 2020, "Health", "North"),
        record(20.0, 2021, "Health", "North"),
    ]);
    let result = cube
        .aggregate(&AggregateRequest::new().drilldown("yearmonth").order("yearmonth", false))
        .unwrap();
    assert_eq!(result.drilldown[0]["time"]["yearmonth"], json!("2020-01"));
    assert_eq!(result.drilldown[1]["time"]["yearmonth"], json!("2021-01"));
}

#[test]
fn test_simple_field_drilldown() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(25.0, 2020, "Health", "South"),
    ]);
    let result = cube
        .aggregate(&AggregateRequest::new().drilldown("region"))
        .unwrap();
    assert_eq!(result.summary.num_drilldowns, 2);
    assert_eq!(result.drilldown[0]["region"], json!("North"));
}

#[test]
fn test_cuts_filter_and_or_widen() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(50.0, 2020, "Defence", "North"),
        record(25.0, 2020, "Education", "South"),
    ]);

    let narrow = cube
        .aggregate(&AggregateRequest::new().cut("to.label", "Health"))
        .unwrap();
    assert_eq!(narrow.summary.num_entries, 1);
    assert_eq!(narrow.summary.value, 100.0);

    // A second value for the same key widens the cut (OR).
    let widened = cube
        .aggregate(
            &AggregateRequest::new()
                .cut("to.label", "Health")
                .cut("to.label", "Defence"),
        )
        .unwrap();
    assert!(widened.summary.num_entries >= narrow.summary.num_entries);
    assert_eq!(widened.summary.num_entries, 2);
    assert_eq!(widened.summary.value, 150.0);

    // Cuts on distinct keys combine with AND.
    let narrowed = cube
        .aggregate(
            &AggregateRequest::new()
                .cut("to.label", "Health")
                .cut("region", "South"),
        )
        .unwrap();
    assert_eq!(narrowed.summary.num_entries, 0);
}

#[test]
fn test_cut_on_year_label() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(25.0, 2021, "Health", "North"),
    ]);
    let result = cube
        .aggregate(&AggregateRequest::new().cut("year", "2020"))
        .unwrap();
    assert_eq!(result.summary.num_entries, 1);
    assert_eq!(result.summary.value, 100.0);
}

#[test]
fn test_unknown_keys_fail_before_execution() {
    let cube = health_cube();
    for request in [
        AggregateRequest::new().drilldown("nope"),
        AggregateRequest::new().cut("nope", "x"),
        AggregateRequest::new().drilldown("to.nope"),
        AggregateRequest::new().order("nope", true),
    ] {
        assert!(
            matches!(cube.aggregate(&request), Err(CubeError::UnknownField(_))),
            "expected UnknownField for {request:?}"
        );
    }
}

#[test]
fn test_order_key_requiring_join_alone_is_invalid() {
    let cube = health_cube();
    let err = cube
        .aggregate(&AggregateRequest::new().order("to.label", false))
        .unwrap_err();
    assert!(matches!(err, CubeError::InvalidQuery(_)));

    // The same key is fine once the dimension is part of the drilldowns.
    cube.aggregate(
        &AggregateRequest::new()
            .drilldown("to")
            .order("to.label", false),
    )
    .unwrap();
}

#[test]
fn test_ordering_by_simple_field_needs_no_join() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(25.0, 2020, "Health", "South"),
    ]);
    let result = cube
        .aggregate(
            &AggregateRequest::new()
                .drilldown("region")
                .order("region", true),
        )
        .unwrap();
    assert_eq!(result.drilldown[0]["region"], json!("South"));
}

#[test]
fn test_non_measure_aggregation_is_invalid() {
    let cube = health_cube();
    let err = cube
        .aggregate(&AggregateRequest::new().measure("region"))
        .unwrap_err();
    assert!(matches!(err, CubeError::InvalidQuery(_)));
    let err = cube
        .aggregate(&AggregateRequest::new().measure("missing"))
        .unwrap_err();
    assert!(matches!(err, CubeError::UnknownField(_)));
}

#[test]
fn test_aggregate_requires_generated_schema() {
    let mut cube = Cube::new(&description(), MemoryStore::new()).unwrap();
    cube.init().unwrap();
    let err = cube.aggregate(&AggregateRequest::new()).unwrap_err();
    assert!(matches!(err, CubeError::NotGenerated(_)));
}

#[test]
fn test_paging_is_disjoint_and_exhaustive() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(25.0, 2020, "Defence", "South"),
    ]);

    let unpaged = cube
        .aggregate(&AggregateRequest::new().drilldown("to"))
        .unwrap();
    assert_eq!(unpaged.drilldown.len(), 2);

    let page1 = cube
        .aggregate(&AggregateRequest::new().drilldown("to").pagesize(1).page(1))
        .unwrap();
    let page2 = cube
        .aggregate(&AggregateRequest::new().drilldown("to").pagesize(1).page(2))
        .unwrap();

    assert_eq!(page1.summary.pages, 2);
    assert_eq!(page1.summary.num_drilldowns, 2);
    assert_eq!(page1.drilldown.len(), 1);
    assert_eq!(page2.drilldown.len(), 1);
    assert_ne!(
        page1.drilldown[0]["to"]["label"],
        page2.drilldown[0]["to"]["label"]
    );
    assert_eq!(
        vec![page1.drilldown[0].clone(), page2.drilldown[0].clone()],
        unpaged.drilldown
    );

    // Summary totals ignore paging.
    assert_eq!(page1.summary.value, unpaged.summary.value);
    assert_eq!(page2.summary.num_entries, 2);
}

#[test]
fn test_page_and_pagesize_validation() {
    let cube = health_cube();
    assert!(matches!(
        cube.aggregate(&AggregateRequest::new().page(0)),
        Err(CubeError::InvalidQuery(_))
    ));
    assert!(matches!(
        cube.aggregate(&AggregateRequest::new().pagesize(0)),
        Err(CubeError::InvalidQuery(_))
    ));
}

#[test]
fn test_response_wire_shape() {
    let cube = health_cube();
    let value = cube
        .aggregate(&AggregateRequest::new().drilldown("to"))
        .unwrap()
        .to_value();
    assert_eq!(value["summary"]["amount"], json!(150.0));
    assert_eq!(value["summary"]["currency"]["amount"], json!("GBP"));
    assert_eq!(value["summary"]["pagesize"], json!(10000));
    assert_eq!(value["drilldown"][0]["to"]["label"], json!("Health"));
}

#[test]
fn test_multiple_drilldowns_nest_per_dimension() {
    let cube = loaded_cube(&[
        record(100.0, 2020, "Health", "North"),
        record(25.0, 2021, "Defence", "South"),
    ]);
    let result = cube
        .aggregate(
            &AggregateRequest::new()
                .drilldown("to.label")
                .drilldown("year")
                .drilldown("region"),
        )
        .unwrap();
    assert_eq!(result.summary.num_drilldowns, 2);
    let row = &result.drilldown[0];
    assert_eq!(row["to"]["label"], json!("Health"));
    assert_eq!(row["time"]["year"], json!("2020"));
    assert_eq!(row["region"], json!("North"));
}
