//! Denormalized entry listing.
//!
//! `entries()` walks the fact table joined to every compound dimension
//! and yields one fully denormalized mapping per entry, each compound
//! dimension nested as a sub-mapping of its attributes. The iterator is
//! lazy (rows are fetched in batches), finite, and restartable - calling
//! `entries()` again starts a fresh walk.

use std::collections::VecDeque;

use serde_json::{Map, Value};

use crate::error::{CubeError, CubeResult};
use crate::model::CubeModel;
use crate::schema::SchemaBinding;
use crate::sql::{table_col, ExprExt, OrderByExpr, Query, SelectExpr, TableRef};
use crate::store::{Row, StorageExecutor};

use super::aggregate::FACT_ALIAS;

/// Rows fetched per round trip.
const BATCH_SIZE: u64 = 5000;

/// Compile the denormalizing entry query (without pagination).
pub(crate) fn compile_query(model: &CubeModel, binding: &SchemaBinding) -> CubeResult<Query> {
    let mut select: Vec<SelectExpr> = vec![table_col(FACT_ALIAS, "id").alias("id")];
    for field in model.fields() {
        if !field.is_compound() {
            let column = field.fact_column();
            select.push(table_col(FACT_ALIAS, &column).alias(&column));
        }
    }

    let mut query = Query::new().from(TableRef::new(&binding.fact_table().name).with_alias(FACT_ALIAS));
    for field in model.compounds() {
        let name = field.name();
        let edge = binding
            .join_for(name)
            .ok_or_else(|| CubeError::UnknownField(name.to_string()))?;
        query = query.inner_join(
            TableRef::new(&edge.table).with_alias(name),
            table_col(FACT_ALIAS, &edge.fact_column).eq(table_col(name, &edge.key_column)),
        );
        for attribute in field.attributes().into_iter().flat_map(|a| a.keys()) {
            select.push(table_col(name, attribute).alias(&format!("{name}__{attribute}")));
        }
    }

    // Stable ordering keeps pagination restartable and disjoint.
    Ok(query
        .select(select)
        .order_by(vec![OrderByExpr::asc(table_col(FACT_ALIAS, "id"))]))
}

/// Decode one flat result row into the nested entry shape.
fn decode_entry(row: &Row, model: &CubeModel) -> Value {
    let mut out = Map::new();
    out.insert("id".into(), row.get("id").cloned().unwrap_or(Value::Null));
    for field in model.fields() {
        if field.is_compound() {
            let name = field.name();
            let mut nested = Map::new();
            for attribute in field.attributes().into_iter().flat_map(|a| a.keys()) {
                nested.insert(
                    attribute.clone(),
                    row.get(&format!("{name}__{attribute}"))
                        .cloned()
                        .unwrap_or(Value::Null),
                );
            }
            out.insert(name.to_string(), Value::Object(nested));
        } else {
            let column = field.fact_column();
            out.insert(
                column.clone(),
                row.get(&column).cloned().unwrap_or(Value::Null),
            );
        }
    }
    Value::Object(out)
}

/// A lazy, finite, restartable walk over denormalized entries.
pub struct Entries<'a, S: StorageExecutor> {
    store: &'a S,
    model: &'a CubeModel,
    query: Query,
    offset: u64,
    remaining: Option<u64>,
    buffer: VecDeque<Value>,
    done: bool,
}

impl<'a, S: StorageExecutor> Entries<'a, S> {
    pub(crate) fn new(
        store: &'a S,
        model: &'a CubeModel,
        query: Query,
        limit: Option<u64>,
        offset: u64,
    ) -> Self {
        Self {
            store,
            model,
            query,
            offset,
            remaining: limit,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    fn fill(&mut self) -> CubeResult<()> {
        let batch = match self.remaining {
            Some(remaining) => remaining.min(BATCH_SIZE),
            None => BATCH_SIZE,
        };
        if batch == 0 {
            self.done = true;
            return Ok(());
        }

        let page = self.query.clone().limit(batch).offset(self.offset);
        let rows = self.store.fetch(&page)?;
        let fetched = rows.len() as u64;
        self.offset += fetched;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= fetched.min(*remaining);
        }
        if fetched < batch {
            self.done = true;
        }
        let model = self.model;
        self.buffer
            .extend(rows.iter().map(|row| decode_entry(row, model)));
        Ok(())
    }
}

impl<'a, S: StorageExecutor> Iterator for Entries<'a, S> {
    type Item = CubeResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            if let Err(e) = self.fill() {
                self.done = true;
                return Some(Err(e));
            }
        }
        self.buffer.pop_front().map(Ok)
    }
}
