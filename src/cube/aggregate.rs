//! Aggregation request compilation and result decoding.
//!
//! An aggregate runs as three logical stages over the star schema:
//! summary totals under the cuts, the distinct-group count for paging
//! metadata, and the paged, grouped, ordered drilldown rows. Every key is
//! resolved against the model before the first stage executes, so an
//! unknown key never runs a partial query.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use crate::error::{CubeError, CubeResult};
use crate::model::{CubeModel, Field, ResolvedKey, TimeLabel};
use crate::schema::SchemaBinding;
use crate::sql::{
    count, count_star, lit_int, lit_value, substr, sum, table_col, Expr, ExprExt, OrderByExpr,
    Query, SelectExpr, TableRef,
};
use crate::store::{Row, StorageExecutor};

/// Alias of the fact table in compiled queries.
pub(crate) const FACT_ALIAS: &str = "entry";

/// An aggregation request: measure, drilldowns, cuts, paging, ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub measure: String,
    pub drilldowns: Vec<String>,
    pub cuts: Vec<(String, Value)>,
    pub page: u64,
    pub pagesize: u64,
    /// (key, descending) pairs; defaults to the measure, descending.
    pub order: Vec<(String, bool)>,
}

impl Default for AggregateRequest {
    fn default() -> Self {
        Self {
            measure: "amount".into(),
            drilldowns: Vec::new(),
            cuts: Vec::new(),
            page: 1,
            pagesize: 10_000,
            order: Vec::new(),
        }
    }
}

impl AggregateRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measure(mut self, measure: &str) -> Self {
        self.measure = measure.into();
        self
    }

    pub fn drilldown(mut self, key: &str) -> Self {
        self.drilldowns.push(key.into());
        self
    }

    pub fn cut(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.cuts.push((key.into(), value.into()));
        self
    }

    pub fn page(mut self, page: u64) -> Self {
        self.page = page;
        self
    }

    pub fn pagesize(mut self, pagesize: u64) -> Self {
        self.pagesize = pagesize;
        self
    }

    pub fn order(mut self, key: &str, descending: bool) -> Self {
        self.order.push((key.into(), descending));
        self
    }
}

/// The summary block of an aggregate response.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSummary {
    pub measure: String,
    pub value: f64,
    pub num_entries: u64,
    pub currency: Option<String>,
    pub num_drilldowns: u64,
    pub page: u64,
    pub pages: u64,
    pub pagesize: u64,
}

impl AggregateSummary {
    /// Render the wire shape: the measure total keyed by its name, and a
    /// `currency` sub-mapping per measure.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert(self.measure.clone(), json!(self.value));
        map.insert("num_entries".into(), json!(self.num_entries));
        let mut currency = Map::new();
        currency.insert(self.measure.clone(), json!(self.currency));
        map.insert("currency".into(), Value::Object(currency));
        map.insert("num_drilldowns".into(), json!(self.num_drilldowns));
        map.insert("page".into(), json!(self.page));
        map.insert("pages".into(), json!(self.pages));
        map.insert("pagesize".into(), json!(self.pagesize));
        Value::Object(map)
    }
}

/// An aggregate response: one decoded mapping per drilldown row plus the
/// summary.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateResult {
    pub drilldown: Vec<Value>,
    pub summary: AggregateSummary,
}

impl AggregateResult {
    pub fn to_value(&self) -> Value {
        json!({
            "drilldown": self.drilldown,
            "summary": self.summary.to_value(),
        })
    }
}

/// Run an aggregation against a generated cube.
pub(crate) fn run<S: StorageExecutor>(
    model: &CubeModel,
    binding: &SchemaBinding,
    store: &S,
    request: &AggregateRequest,
) -> CubeResult<AggregateResult> {
    if request.page < 1 {
        return Err(CubeError::InvalidQuery("page must be >= 1".into()));
    }
    if request.pagesize < 1 {
        return Err(CubeError::InvalidQuery("pagesize must be > 0".into()));
    }
    let measure = &request.measure;
    match model.field(measure)? {
        Field::Measure(_) => {}
        _ => {
            return Err(CubeError::InvalidQuery(format!(
                "'{measure}' is not a measure"
            )))
        }
    }

    // Resolve every key up front; nothing executes past an unknown key.
    let drilldowns: Vec<ResolvedKey> = request
        .drilldowns
        .iter()
        .map(|key| model.resolve_key(key))
        .collect::<CubeResult<_>>()?;
    let cuts: Vec<(ResolvedKey, Value)> = request
        .cuts
        .iter()
        .map(|(key, value)| Ok((model.resolve_key(key)?, value.clone())))
        .collect::<CubeResult<_>>()?;

    // Dimensions touched by drilldowns or cuts get a join edge.
    let joined: BTreeSet<String> = drilldowns
        .iter()
        .chain(cuts.iter().map(|(resolved, _)| resolved))
        .filter_map(|resolved| resolved.dimension().map(String::from))
        .collect();

    // Drilldown select list and group-by expansion.
    let mut fields: Vec<SelectExpr> = Vec::new();
    let mut group_by: Vec<Expr> = Vec::new();
    for resolved in &drilldowns {
        match resolved {
            ResolvedKey::TimeLabel { dimension, label } => {
                let expr = label_expr(dimension, *label);
                group_by.push(expr.clone());
                fields.push(expr.alias(&format!("{}__{}", dimension, label.name())));
            }
            ResolvedKey::Attribute {
                dimension,
                attribute,
            } => {
                let expr = table_col(dimension, attribute);
                group_by.push(expr.clone());
                fields.push(expr.alias(&format!("{dimension}__{attribute}")));
            }
            ResolvedKey::Fact { field } => {
                let expr = table_col(FACT_ALIAS, field);
                group_by.push(expr.clone());
                fields.push(expr.alias(field));
            }
            // A bare compound dimension groups at full-row granularity:
            // every column of its table.
            ResolvedKey::Dimension { dimension } => {
                let table = binding.dimension_table(dimension).ok_or_else(|| {
                    CubeError::UnknownField(dimension.clone())
                })?;
                for column in table.column_names() {
                    let expr = table_col(dimension, &column);
                    group_by.push(expr.clone());
                    fields.push(expr.alias(&format!("{dimension}__{column}")));
                }
            }
        }
    }

    // Cut conditions: OR within one resolved column, AND across columns.
    let mut filters: BTreeMap<String, (Expr, Vec<Value>)> = BTreeMap::new();
    for (resolved, value) in &cuts {
        let expr = cut_expr(binding, resolved)?;
        let key = format!("{expr:?}");
        filters
            .entry(key)
            .or_insert_with(|| (expr, Vec::new()))
            .1
            .push(value.clone());
    }
    let conditions: Vec<Expr> = filters
        .into_values()
        .map(|(column, values)| {
            values
                .iter()
                .map(|value| column.clone().eq(lit_value(value)))
                .reduce(|a, b| a.or(b))
                .expect("cut groups are never empty")
                .paren()
        })
        .collect();

    // Ordering; the measure itself orders by the aggregated sum.
    let order = if request.order.is_empty() {
        vec![(measure.clone(), true)]
    } else {
        request.order.clone()
    };
    let mut order_by: Vec<OrderByExpr> = Vec::new();
    for (key, descending) in &order {
        let exprs: Vec<Expr> = if key == measure {
            vec![sum(table_col(FACT_ALIAS, measure))]
        } else {
            match model.resolve_key(key)? {
                ResolvedKey::Fact { field } => vec![table_col(FACT_ALIAS, &field)],
                resolved => {
                    let dimension = resolved
                        .dimension()
                        .expect("non-fact keys name a dimension")
                        .to_string();
                    if !joined.contains(&dimension) {
                        return Err(CubeError::InvalidQuery(format!(
                            "order key '{key}' is not among the drilldowns or cuts"
                        )));
                    }
                    match resolved {
                        ResolvedKey::TimeLabel { dimension, label } => {
                            vec![label_expr(&dimension, label)]
                        }
                        ResolvedKey::Attribute {
                            dimension,
                            attribute,
                        } => vec![table_col(&dimension, &attribute)],
                        ResolvedKey::Dimension { dimension } => {
                            let table = binding.dimension_table(&dimension).ok_or_else(|| {
                                CubeError::UnknownField(dimension.clone())
                            })?;
                            table
                                .column_names()
                                .iter()
                                .filter(|c| c.as_str() != "id")
                                .map(|c| table_col(&dimension, c))
                                .collect()
                        }
                        ResolvedKey::Fact { .. } => unreachable!("handled above"),
                    }
                }
            }
        };
        for expr in exprs {
            order_by.push(if *descending {
                OrderByExpr::desc(expr)
            } else {
                OrderByExpr::asc(expr)
            });
        }
    }

    // Shared query scaffold: fact table, join edges, cut conditions.
    let base = |mut query: Query| -> CubeResult<Query> {
        query = query.from(TableRef::new(&binding.fact_table().name).with_alias(FACT_ALIAS));
        for dimension in &joined {
            let edge = binding.join_for(dimension).ok_or_else(|| {
                CubeError::InvalidQuery(format!(
                    "dimension '{dimension}' has no joinable table"
                ))
            })?;
            query = query.inner_join(
                TableRef::new(&edge.table).with_alias(dimension),
                table_col(FACT_ALIAS, &edge.fact_column).eq(table_col(dimension, &edge.key_column)),
            );
        }
        for condition in &conditions {
            query = query.filter(condition.clone());
        }
        Ok(query)
    };

    let stats = vec![
        sum(table_col(FACT_ALIAS, measure)).alias(measure),
        count(table_col(FACT_ALIAS, "id")).alias("num_entries"),
    ];

    // Stage 1: totals under the cuts only.
    let summary_query = base(Query::new().select(stats.clone()))?;
    let summary_row = store.fetch(&summary_query)?;
    let (total, num_entries) = match summary_row.first() {
        Some(row) => (
            row.get(measure.as_str()).and_then(Value::as_f64).unwrap_or(0.0),
            row.get("num_entries").and_then(Value::as_u64).unwrap_or(0),
        ),
        None => (0.0, 0),
    };

    // Stage 2: number of distinct groups, for paging metadata.
    let num_drilldowns = if group_by.is_empty() {
        1
    } else {
        let grouped = base(Query::new().select(vec![lit_int(1).alias("one")]))?
            .group_by(group_by.clone());
        let count_query = Query::new()
            .select(vec![count_star().alias("num_drilldowns")])
            .from_subquery(grouped, "q");
        store
            .fetch(&count_query)?
            .first()
            .and_then(|row| row.get("num_drilldowns"))
            .and_then(Value::as_u64)
            .unwrap_or(0)
    };

    // Stage 3: the paged drilldown rows.
    let mut select = stats;
    select.extend(fields);
    let offset = (request.page - 1) * request.pagesize;
    let rows_query = base(Query::new().select(select))?
        .group_by(group_by)
        .order_by(order_by)
        .limit(request.pagesize)
        .offset(offset);
    let rows = store.fetch(&rows_query)?;

    let drilldown = rows
        .iter()
        .map(|row| decode_row(row, measure, &drilldowns, binding))
        .collect();

    let pages = num_drilldowns.div_ceil(request.pagesize);
    Ok(AggregateResult {
        drilldown,
        summary: AggregateSummary {
            measure: measure.clone(),
            value: total,
            num_entries,
            currency: model.dataset().currency.clone(),
            num_drilldowns,
            page: request.page,
            pages,
            pagesize: request.pagesize,
        },
    })
}

/// The derived expression for a virtual time label: a prefix of the
/// canonical ISO date on the time dimension's table.
fn label_expr(dimension: &str, label: TimeLabel) -> Expr {
    substr(table_col(dimension, "date"), 1, label.prefix_len())
}

/// The column a cut condition applies to. A bare compound dimension cuts
/// on its foreign-key column - the member's content hash.
fn cut_expr(binding: &SchemaBinding, resolved: &ResolvedKey) -> CubeResult<Expr> {
    Ok(match resolved {
        ResolvedKey::Fact { field } => table_col(FACT_ALIAS, field),
        ResolvedKey::Attribute {
            dimension,
            attribute,
        } => table_col(dimension, attribute),
        ResolvedKey::TimeLabel { dimension, label } => label_expr(dimension, *label),
        ResolvedKey::Dimension { dimension } => {
            let edge = binding.join_for(dimension).ok_or_else(|| {
                CubeError::UnknownField(dimension.clone())
            })?;
            table_col(FACT_ALIAS, &edge.fact_column)
        }
    })
}

/// Decode one result row into the nested response structure: measure and
/// entry count at the top level, one sub-mapping per drilldown dimension.
fn decode_row(
    row: &Row,
    measure: &str,
    drilldowns: &[ResolvedKey],
    binding: &SchemaBinding,
) -> Value {
    let mut out = Map::new();
    out.insert(
        measure.to_string(),
        json!(row.get(measure).and_then(Value::as_f64).unwrap_or(0.0)),
    );
    out.insert(
        "num_entries".into(),
        json!(row.get("num_entries").and_then(Value::as_u64).unwrap_or(0)),
    );

    for resolved in drilldowns {
        match resolved {
            ResolvedKey::Fact { field } => {
                out.insert(field.clone(), row.get(field).cloned().unwrap_or(Value::Null));
            }
            ResolvedKey::TimeLabel { dimension, label } => {
                let cell = row
                    .get(&format!("{}__{}", dimension, label.name()))
                    .cloned()
                    .unwrap_or(Value::Null);
                nested(&mut out, dimension).insert(label.name().to_string(), cell);
            }
            ResolvedKey::Attribute {
                dimension,
                attribute,
            } => {
                let cell = row
                    .get(&format!("{dimension}__{attribute}"))
                    .cloned()
                    .unwrap_or(Value::Null);
                nested(&mut out, dimension).insert(attribute.clone(), cell);
            }
            ResolvedKey::Dimension { dimension } => {
                if let Some(table) = binding.dimension_table(dimension) {
                    for column in table.column_names() {
                        if column == "id" {
                            continue;
                        }
                        let cell = row
                            .get(&format!("{dimension}__{column}"))
                            .cloned()
                            .unwrap_or(Value::Null);
                        nested(&mut out, dimension).insert(column, cell);
                    }
                }
            }
        }
    }

    Value::Object(out)
}

/// Get-or-create the sub-mapping for one drilldown dimension.
fn nested<'a>(out: &'a mut Map<String, Value>, dimension: &str) -> &'a mut Map<String, Value> {
    out.entry(dimension.to_string())
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .expect("dimension sub-mapping is always an object")
}
