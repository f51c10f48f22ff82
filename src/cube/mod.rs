//! The cube controller: lifecycle, loading, and querying.
//!
//! A [`Cube`] owns the parsed model, the storage executor, and the
//! cached schema binding, and routes every request to the actual data
//! store. Lifecycle: `Uninitialized -> Initialized (init) -> Generated
//! (generate)`; `drop()` returns to Initialized, `flush()` empties rows
//! in place. `init()`, `generate()` and `drop()` must be externally
//! serialized against each other; everything else is a single logical
//! unit of work.

pub mod aggregate;
pub mod entries;

pub use aggregate::{AggregateRequest, AggregateResult, AggregateSummary};
pub use entries::Entries;

use serde_json::{json, Value};
use tracing::{debug, info};

use crate::error::{CubeError, CubeResult};
use crate::hash::content_hash;
use crate::model::{CubeModel, Dataset, ResolvedKey, Transformed};
use crate::schema::SchemaBinding;
use crate::sql::{
    col, count_star, lit_str, lit_value, ExprExt, Insert, OnConflict, Query, TableRef,
};
use crate::store::{StorageError, StorageExecutor};

/// A dataset bound to a storage executor.
pub struct Cube<S: StorageExecutor> {
    model: CubeModel,
    store: S,
    binding: Option<SchemaBinding>,
    generated: bool,
}

impl<S: StorageExecutor> Cube<S> {
    /// Construct a cube from a model description. The cube starts
    /// uninitialized; call [`Cube::init`] before anything else.
    pub fn new(description: &Value, store: S) -> CubeResult<Self> {
        let model = CubeModel::from_value(description)?;
        Ok(Self {
            model,
            store,
            binding: None,
            generated: false,
        })
    }

    pub fn model(&self) -> &CubeModel {
        &self.model
    }

    pub fn dataset(&self) -> &Dataset {
        self.model.dataset()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Bind the model to a physical schema without creating anything.
    ///
    /// Idempotent and callable repeatedly; also probes the store so a
    /// cube bound to an already-generated schema starts in the Generated
    /// state.
    pub fn init(&mut self) -> CubeResult<()> {
        if self.binding.is_none() {
            self.binding = Some(SchemaBinding::bind(&self.model));
        }
        let fact = &self.binding.as_ref().expect("bound above").fact_table().name;
        self.generated = self.store.table_exists(fact)?;
        Ok(())
    }

    /// Whether the physical schema exists.
    pub fn is_generated(&self) -> bool {
        self.generated
    }

    /// Create the physical tables. A no-op when the fact table already
    /// exists with a compatible shape; a `SchemaConflict` error when the
    /// existing shape no longer matches the model.
    pub fn generate(&mut self) -> CubeResult<()> {
        self.init()?;
        let binding = self.binding.as_ref().expect("init binds the schema");

        if self.generated {
            let actual = self.store.table_columns(&binding.fact_table().name)?;
            binding.verify_fact_columns(&actual)?;
            return Ok(());
        }

        for stmt in binding.create_plan() {
            self.store.create_table(&stmt)?;
        }
        self.generated = true;
        info!(dataset = %self.model.dataset().name, "generated physical schema");
        Ok(())
    }

    /// Drop every table of this dataset. The binding is retained, so
    /// `generate()` re-creates an empty, query-ready schema.
    pub fn drop(&mut self) -> CubeResult<()> {
        self.init()?;
        let binding = self.binding.as_ref().expect("init binds the schema");
        for stmt in binding.drop_plan() {
            self.store.drop_table(&stmt)?;
        }
        self.generated = false;
        info!(dataset = %self.model.dataset().name, "dropped physical schema");
        Ok(())
    }

    /// Delete all rows, keeping the table structure.
    pub fn flush(&mut self) -> CubeResult<()> {
        let plan = self.require_generated()?.flush_plan();
        for stmt in plan {
            self.store.truncate(&stmt)?;
        }
        Ok(())
    }

    /// Load one denormalized record.
    ///
    /// Dimension members are resolved or created by content hash; the
    /// fact row is upserted under the order-independent hash of the full
    /// record, so identical re-loads are idempotent and same-id loads
    /// with different content update in place. Returns the fact row id.
    pub fn load(&mut self, record: &Value) -> CubeResult<String> {
        if self.binding.is_none() || !self.generated {
            return Err(CubeError::NotGenerated(self.model.dataset().name.clone()));
        }
        let Self {
            model,
            store,
            binding,
            ..
        } = self;
        let binding = binding.as_ref().expect("checked above");

        let mapping = record.as_object().ok_or_else(|| {
            CubeError::load("entry", format!("expected a record mapping, got {record}"))
        })?;

        let mut columns: Vec<(String, Value)> = Vec::new();
        for field in model.fields() {
            let raw = mapping.get(field.name()).ok_or_else(|| {
                CubeError::load(field.name(), "missing from the input record")
            })?;
            match field.transform_input(raw)? {
                Transformed::Fact(cols) => columns.extend(cols),
                Transformed::Member {
                    dimension,
                    fact_column,
                    key,
                    attributes,
                } => {
                    let table = binding
                        .dimension_table(&dimension)
                        .ok_or_else(|| CubeError::UnknownField(dimension.clone()))?;
                    let created = upsert_member(store, &table.name, &key, &attributes)?;
                    if created {
                        debug!(dimension = %dimension, member = %key, "created dimension member");
                    }
                    columns.push((fact_column, json!(key)));
                }
            }
        }

        let id = content_hash(record);
        let mut names = vec!["id".to_string()];
        let mut values = vec![lit_str(&id)];
        let mut updates = Vec::with_capacity(columns.len());
        for (name, value) in &columns {
            names.push(name.clone());
            values.push(lit_value(value));
            updates.push((name.clone(), lit_value(value)));
        }
        let upsert = Insert::into(binding.fact_table().name.as_str())
            .columns(names)
            .values(values)
            .on_conflict(OnConflict::do_update(["id"], updates));
        store.insert(&upsert)?;

        debug!(entry = %id, "loaded entry");
        Ok(id)
    }

    /// Run an aggregation query. See [`AggregateRequest`].
    pub fn aggregate(&self, request: &AggregateRequest) -> CubeResult<AggregateResult> {
        let binding = self.require_generated()?;
        aggregate::run(&self.model, binding, &self.store, request)
    }

    /// Walk the fully denormalized entries, lazily and restartably.
    pub fn entries(&self, limit: Option<u64>, offset: u64) -> CubeResult<Entries<'_, S>> {
        let binding = self.require_generated()?;
        let query = entries::compile_query(&self.model, binding)?;
        Ok(Entries::new(&self.store, &self.model, query, limit, offset))
    }

    /// Number of loaded entries; 0 for a cube without a generated
    /// schema.
    pub fn len(&self) -> CubeResult<u64> {
        let binding = match self.require_generated() {
            Ok(binding) => binding,
            Err(CubeError::NotGenerated(_)) => return Ok(0),
            Err(e) => return Err(e),
        };
        let query = Query::new()
            .select(vec![count_star().alias("num_entries")])
            .from(TableRef::new(&binding.fact_table().name));
        let rows = self.store.fetch(&query)?;
        Ok(rows
            .first()
            .and_then(|row| row.get("num_entries"))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    pub fn is_empty(&self) -> CubeResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Resolve a field-or-composite key for collaborators.
    pub fn key(&self, key: &str) -> CubeResult<ResolvedKey> {
        self.model.resolve_key(key)
    }

    fn require_generated(&self) -> CubeResult<&SchemaBinding> {
        match &self.binding {
            Some(binding) if self.generated => Ok(binding),
            _ => Err(CubeError::NotGenerated(self.model.dataset().name.clone())),
        }
    }
}

/// Resolve or create a dimension member row.
///
/// Reads first (the common case once a member exists), inserts when
/// absent, and on a uniqueness violation of the hash key - a concurrent
/// loader won the insert - falls back to re-reading the existing row.
/// The fallback is bounded to exactly one retry. Returns whether this
/// call created the member.
fn upsert_member<S: StorageExecutor>(
    store: &mut S,
    table: &str,
    key: &str,
    attributes: &[(String, Value)],
) -> CubeResult<bool> {
    let lookup = Query::new()
        .select(vec![col("id")])
        .from(TableRef::new(table))
        .filter(col("id").eq(lit_str(key)));
    if !store.fetch(&lookup)?.is_empty() {
        return Ok(false);
    }

    let mut columns = vec!["id".to_string()];
    let mut values = vec![lit_str(key)];
    for (name, value) in attributes {
        columns.push(name.clone());
        values.push(lit_value(value));
    }
    let insert = Insert::into(table).columns(columns).values(values);
    match store.insert(&insert) {
        Ok(_) => Ok(true),
        Err(StorageError::UniqueViolation { .. }) => {
            if store.fetch(&lookup)?.is_empty() {
                return Err(CubeError::load(
                    table,
                    "dimension member vanished during upsert",
                ));
            }
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
