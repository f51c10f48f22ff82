use abacus::model::DataType;
use abacus::sql::{
    col, count_star, lit_float, lit_str, sum, table_col, ColumnDef, CreateTable, DropTable,
    ExprExt, Insert, OnConflict, OrderByExpr, Query, TableRef, Truncate,
};
use abacus::store::{MemoryStore, StorageError, StorageExecutor};
use serde_json::json;

fn seeded_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store
        .create_table(
            &CreateTable::new("cra__entry")
                .if_not_exists()
                .column(ColumnDef::new("id", DataType::Id).primary_key())
                .column(ColumnDef::new("amount", DataType::Float))
                .column(ColumnDef::new("to_id", DataType::Id)),
        )
        .unwrap();
    store
        .create_table(
            &CreateTable::new("cra__to")
                .column(ColumnDef::new("id", DataType::Id).primary_key())
                .column(ColumnDef::new("label", DataType::String)),
        )
        .unwrap();
    for (id, label) in [("h", "Health"), ("d", "Defence")] {
        store
            .insert(
                &Insert::into("cra__to")
                    .columns(["id", "label"])
                    .values([lit_str(id), lit_str(label)]),
            )
            .unwrap();
    }
    for (id, amount, to_id) in [("e1", 100.0, "h"), ("e2", 50.0, "h"), ("e3", 25.0, "d")] {
        store
            .insert(
                &Insert::into("cra__entry")
                    .columns(["id", "amount", "to_id"])
                    .values([lit_str(id), lit_float(amount), lit_str(to_id)]),
            )
            .unwrap();
    }
    store
}

#[test]
fn test_table_introspection() {
    let store = seeded_store();
    assert!(store.table_exists("cra__entry").unwrap());
    assert!(!store.table_exists("cra__nope").unwrap());
    assert_eq!(
        store.table_columns("cra__entry").unwrap(),
        vec!["id", "amount", "to_id"]
    );
    assert!(matches!(
        store.table_columns("cra__nope"),
        Err(StorageError::UnknownTable(_))
    ));
}

#[test]
fn test_create_table_if_not_exists_tolerates_duplicates() {
    let mut store = seeded_store();
    store
        .create_table(
            &CreateTable::new("cra__entry")
                .if_not_exists()
                .column(ColumnDef::new("id", DataType::Id).primary_key()),
        )
        .unwrap();
    // Without the clause a duplicate is an error.
    assert!(store
        .create_table(
            &CreateTable::new("cra__entry").column(ColumnDef::new("id", DataType::Id))
        )
        .is_err());
}

#[test]
fn test_primary_key_uniqueness() {
    let mut store = seeded_store();
    let err = store
        .insert(
            &Insert::into("cra__to")
                .columns(["id", "label"])
                .values([lit_str("h"), lit_str("Other")]),
        )
        .unwrap_err();
    assert!(
        matches!(err, StorageError::UniqueViolation { ref table, ref column } if table == "cra__to" && column == "id")
    );
}

#[test]
fn test_on_conflict_do_update() {
    let mut store = seeded_store();
    store
        .insert(
            &Insert::into("cra__entry")
                .columns(["id", "amount", "to_id"])
                .values([lit_str("e1"), lit_float(999.0), lit_str("h")])
                .on_conflict(OnConflict::do_update(
                    ["id"],
                    [("amount", lit_float(999.0))],
                )),
        )
        .unwrap();
    let rows = store
        .fetch(
            &Query::new()
                .select(vec![col("amount")])
                .from(TableRef::new("cra__entry"))
                .filter(col("id").eq(lit_str("e1"))),
        )
        .unwrap();
    assert_eq!(rows[0]["amount"], json!(999.0));
    // Still three rows: the conflict updated in place.
    let all = store
        .fetch(
            &Query::new()
                .select(vec![col("id")])
                .from(TableRef::new("cra__entry")),
        )
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn test_grouped_aggregation_with_join_order_and_paging() {
    let store = seeded_store();
    let base = Query::new()
        .select(vec![
            sum(table_col("entry", "amount")).alias("amount"),
            count_star().alias("num_entries"),
            table_col("to", "label").alias("to__label"),
        ])
        .from(TableRef::new("cra__entry").with_alias("entry"))
        .inner_join(
            TableRef::new("cra__to").with_alias("to"),
            table_col("entry", "to_id").eq(table_col("to", "id")),
        )
        .group_by(vec![table_col("to", "label")])
        .order_by(vec![OrderByExpr::desc(sum(table_col("entry", "amount")))]);

    let rows = store.fetch(&base.clone()).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["to__label"], json!("Health"));
    assert_eq!(rows[0]["amount"], json!(150.0));
    assert_eq!(rows[0]["num_entries"], json!(2));

    let paged = store.fetch(&base.limit(1).offset(1)).unwrap();
    assert_eq!(paged.len(), 1);
    assert_eq!(paged[0]["to__label"], json!("Defence"));
}

#[test]
fn test_cut_conditions_and_of_ors() {
    let store = seeded_store();
    let condition = table_col("to", "label")
        .eq(lit_str("Health"))
        .or(table_col("to", "label").eq(lit_str("Defence")))
        .paren()
        .and(table_col("entry", "amount").eq(lit_float(25.0)).paren());
    let rows = store
        .fetch(
            &Query::new()
                .select(vec![count_star().alias("n")])
                .from(TableRef::new("cra__entry").with_alias("entry"))
                .inner_join(
                    TableRef::new("cra__to").with_alias("to"),
                    table_col("entry", "to_id").eq(table_col("to", "id")),
                )
                .filter(condition),
        )
        .unwrap();
    assert_eq!(rows[0]["n"], json!(1));
}

#[test]
fn test_truncate_and_drop() {
    let mut store = seeded_store();
    store.truncate(&Truncate::table("cra__entry")).unwrap();
    assert!(store.table_exists("cra__entry").unwrap());
    let rows = store
        .fetch(
            &Query::new()
                .select(vec![col("id")])
                .from(TableRef::new("cra__entry")),
        )
        .unwrap();
    assert!(rows.is_empty());

    store
        .drop_table(&DropTable::new("cra__entry").if_exists())
        .unwrap();
    assert!(!store.table_exists("cra__entry").unwrap());
    // Dropping again is fine with IF EXISTS, an error without.
    store
        .drop_table(&DropTable::new("cra__entry").if_exists())
        .unwrap();
    assert!(store.drop_table(&DropTable::new("cra__entry")).is_err());
}
