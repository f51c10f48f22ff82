//! In-memory storage executor.
//!
//! `MemoryStore` interprets the plan AST over plain row vectors:
//! nested-loop joins, expression evaluation, grouping with SUM/COUNT,
//! ordering and pagination. It covers exactly the plan shapes the cube
//! engine compiles and rejects anything else with a typed error rather
//! than guessing.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use super::{Row, StorageError, StorageExecutor};
use crate::sql::{
    BinaryOperator, CreateTable, Delete, DropTable, Expr, FromItem, Insert, JoinType, Literal,
    OnConflict, Query, SortDir, TableRef, Truncate, Update,
};

/// A (qualifier, column) → value working row used during query
/// evaluation. The qualifier is the table alias a column is visible
/// under.
type Scoped = BTreeMap<(String, String), Value>;

#[derive(Debug, Clone, Default)]
struct MemTable {
    columns: Vec<String>,
    primary_key: Option<String>,
    rows: Vec<Row>,
}

/// An in-memory relational store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: BTreeMap<String, MemTable>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self, name: &str) -> Result<&MemTable, StorageError> {
        self.tables
            .get(name)
            .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemTable, StorageError> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| StorageError::UnknownTable(name.to_string()))
    }

    /// Rows of a physical table, scoped under the reference's qualifier.
    fn scoped_rows(&self, table_ref: &TableRef) -> Result<Vec<Scoped>, StorageError> {
        let table = self.table(&table_ref.table)?;
        let qualifier = table_ref.qualifier();
        Ok(table
            .rows
            .iter()
            .map(|row| scope_row(row, &table.columns, qualifier))
            .collect())
    }
}

fn scope_row(row: &Row, columns: &[String], qualifier: &str) -> Scoped {
    columns
        .iter()
        .map(|column| {
            (
                (qualifier.to_string(), column.clone()),
                row.get(column).cloned().unwrap_or(Value::Null),
            )
        })
        .collect()
}

impl StorageExecutor for MemoryStore {
    fn create_table(&mut self, stmt: &CreateTable) -> Result<(), StorageError> {
        if self.tables.contains_key(&stmt.name) {
            if stmt.if_not_exists {
                return Ok(());
            }
            return Err(StorageError::Backend(format!(
                "table '{}' already exists",
                stmt.name
            )));
        }
        let table = MemTable {
            columns: stmt.columns.iter().map(|c| c.name.clone()).collect(),
            primary_key: stmt.primary_key_column().map(String::from),
            rows: Vec::new(),
        };
        self.tables.insert(stmt.name.clone(), table);
        Ok(())
    }

    fn drop_table(&mut self, stmt: &DropTable) -> Result<(), StorageError> {
        if self.tables.remove(&stmt.name).is_none() && !stmt.if_exists {
            return Err(StorageError::UnknownTable(stmt.name.clone()));
        }
        Ok(())
    }

    fn truncate(&mut self, stmt: &Truncate) -> Result<(), StorageError> {
        self.table_mut(&stmt.table)?.rows.clear();
        Ok(())
    }

    fn insert(&mut self, stmt: &Insert) -> Result<u64, StorageError> {
        let table_name = stmt.table.clone();
        {
            let table = self.table(&table_name)?;
            for column in &stmt.columns {
                if !table.columns.contains(column) {
                    return Err(StorageError::UnknownColumn {
                        table: table_name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        let mut written = 0;
        for values in &stmt.values {
            if values.len() != stmt.columns.len() {
                return Err(StorageError::Unsupported(
                    "insert row width does not match column list".into(),
                ));
            }
            let mut row = Row::new();
            for (column, expr) in stmt.columns.iter().zip(values) {
                row.insert(column.clone(), literal_value(expr)?);
            }

            let table = self.table_mut(&table_name)?;
            if let Some(pk) = table.primary_key.clone() {
                let key = row.get(&pk).cloned().unwrap_or(Value::Null);
                let existing = table
                    .rows
                    .iter_mut()
                    .find(|r| r.get(&pk).map(|v| values_equal(v, &key)) == Some(true));
                if let Some(existing) = existing {
                    match &stmt.on_conflict {
                        None => {
                            return Err(StorageError::UniqueViolation {
                                table: table_name.clone(),
                                column: pk,
                            });
                        }
                        Some(OnConflict::DoNothing) => continue,
                        Some(OnConflict::DoUpdate {
                            conflict_columns,
                            set,
                        }) => {
                            if conflict_columns.as_slice() != [pk.clone()] {
                                return Err(StorageError::Unsupported(
                                    "conflict target must be the primary key".into(),
                                ));
                            }
                            for (column, expr) in set {
                                existing.insert(column.clone(), literal_value(expr)?);
                            }
                            written += 1;
                            continue;
                        }
                    }
                }
            }
            let table = self.table_mut(&table_name)?;
            table.rows.push(row);
            written += 1;
        }
        Ok(written)
    }

    fn update(&mut self, stmt: &Update) -> Result<u64, StorageError> {
        let table_name = stmt.table.clone();
        let columns = self.table(&table_name)?.columns.clone();
        let mut assignments = Vec::with_capacity(stmt.set.len());
        for (column, expr) in &stmt.set {
            assignments.push((column.clone(), literal_value(expr)?));
        }

        let filter = stmt.filter.clone();
        let table = self.table_mut(&table_name)?;
        let mut changed = 0;
        for row in &mut table.rows {
            let scoped = scope_row(row, &columns, &table_name);
            let matches = match &filter {
                Some(expr) => truthy(&eval(expr, &scoped)?)?,
                None => true,
            };
            if matches {
                for (column, value) in &assignments {
                    row.insert(column.clone(), value.clone());
                }
                changed += 1;
            }
        }
        Ok(changed)
    }

    fn delete(&mut self, stmt: &Delete) -> Result<u64, StorageError> {
        let table_name = stmt.table.clone();
        let columns = self.table(&table_name)?.columns.clone();
        let filter = stmt.filter.clone();
        let table = self.table_mut(&table_name)?;

        let mut kept = Vec::with_capacity(table.rows.len());
        let mut removed = 0;
        for row in table.rows.drain(..) {
            let scoped = scope_row(&row, &columns, &table_name);
            let matches = match &filter {
                Some(expr) => truthy(&eval(expr, &scoped)?)?,
                None => true,
            };
            if matches {
                removed += 1;
            } else {
                kept.push(row);
            }
        }
        table.rows = kept;
        Ok(removed)
    }

    fn fetch(&self, query: &Query) -> Result<Vec<Row>, StorageError> {
        // FROM
        let mut rows: Vec<Scoped> = match &query.from {
            Some(FromItem::Table(table_ref)) => self.scoped_rows(table_ref)?,
            Some(FromItem::Subquery { query, alias }) => {
                let inner = self.fetch(query)?;
                inner
                    .iter()
                    .map(|row| {
                        let columns: Vec<String> = row.keys().cloned().collect();
                        scope_row(row, &columns, alias)
                    })
                    .collect()
            }
            None => {
                return Err(StorageError::Unsupported(
                    "query without a FROM clause".into(),
                ))
            }
        };

        // JOINs (nested loop)
        for join in &query.joins {
            let right_table = self.table(&join.table.table)?;
            let qualifier = join.table.qualifier();
            let mut joined = Vec::new();
            for left in &rows {
                let mut matched = false;
                for right in &right_table.rows {
                    let mut merged = left.clone();
                    merged.extend(scope_row(right, &right_table.columns, qualifier));
                    if truthy(&eval(&join.on, &merged)?)? {
                        joined.push(merged);
                        matched = true;
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    let mut merged = left.clone();
                    for column in &right_table.columns {
                        merged.insert((qualifier.to_string(), column.clone()), Value::Null);
                    }
                    joined.push(merged);
                }
            }
            rows = joined;
        }

        // WHERE
        if let Some(filter) = &query.where_clause {
            let mut filtered = Vec::with_capacity(rows.len());
            for row in rows {
                if truthy(&eval(filter, &row)?)? {
                    filtered.push(row);
                }
            }
            rows = filtered;
        }

        // GROUP BY / aggregation
        let aggregated = !query.group_by.is_empty()
            || query.select.iter().any(|s| s.expr.is_aggregate());
        let groups: Vec<Vec<Scoped>> = if aggregated {
            group_rows(&query.group_by, rows)?
        } else {
            rows.into_iter().map(|row| vec![row]).collect()
        };

        // Projection and sort keys
        let mut produced: Vec<(Vec<Value>, Row)> = Vec::with_capacity(groups.len());
        for group in &groups {
            let mut out = Row::new();
            for (i, select) in query.select.iter().enumerate() {
                let name = select
                    .output_name()
                    .map(String::from)
                    .unwrap_or_else(|| format!("column_{i}"));
                out.insert(name, eval_projected(&select.expr, group)?);
            }
            let mut sort_key = Vec::with_capacity(query.order_by.len());
            for order in &query.order_by {
                sort_key.push(eval_projected(&order.expr, group)?);
            }
            produced.push((sort_key, out));
        }

        // ORDER BY
        if !query.order_by.is_empty() {
            let dirs: Vec<SortDir> = query.order_by.iter().map(|o| o.dir).collect();
            produced.sort_by(|(a, _), (b, _)| {
                for (i, dir) in dirs.iter().enumerate() {
                    let ord = compare_values(&a[i], &b[i]);
                    let ord = match dir {
                        SortDir::Asc => ord,
                        SortDir::Desc => ord.reverse(),
                    };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        // LIMIT / OFFSET
        let mut result: Vec<Row> = produced.into_iter().map(|(_, row)| row).collect();
        if let Some(lo) = &query.limit_offset {
            let offset = lo.offset.unwrap_or(0) as usize;
            result = result.into_iter().skip(offset).collect();
            if let Some(limit) = lo.limit {
                result.truncate(limit as usize);
            }
        }
        Ok(result)
    }

    fn table_exists(&self, table: &str) -> Result<bool, StorageError> {
        Ok(self.tables.contains_key(table))
    }

    fn table_columns(&self, table: &str) -> Result<Vec<String>, StorageError> {
        Ok(self.table(table)?.columns.clone())
    }
}

/// Partition rows into groups by the evaluated group-by key. With an
/// empty key (global aggregation) a single group holds every row - and
/// still exists when there are no rows, matching SQL aggregate
/// semantics.
fn group_rows(group_by: &[Expr], rows: Vec<Scoped>) -> Result<Vec<Vec<Scoped>>, StorageError> {
    if group_by.is_empty() {
        return Ok(vec![rows]);
    }
    let mut keys: Vec<String> = Vec::new();
    let mut groups: Vec<Vec<Scoped>> = Vec::new();
    for row in rows {
        let mut key_parts = Vec::with_capacity(group_by.len());
        for expr in group_by {
            key_parts.push(eval(expr, &row)?);
        }
        let key = serde_json::to_string(&key_parts).unwrap_or_default();
        match keys.iter().position(|k| *k == key) {
            Some(idx) => groups[idx].push(row),
            None => {
                keys.push(key);
                groups.push(vec![row]);
            }
        }
    }
    Ok(groups)
}

/// Evaluate a select/order expression over a group: aggregates fold the
/// whole group, anything else reads the group's first row.
fn eval_projected(expr: &Expr, group: &[Scoped]) -> Result<Value, StorageError> {
    if expr.is_aggregate() {
        return eval_aggregate(expr, group);
    }
    match group.first() {
        Some(row) => eval(expr, row),
        None => Ok(Value::Null),
    }
}

fn eval_aggregate(expr: &Expr, group: &[Scoped]) -> Result<Value, StorageError> {
    match expr {
        Expr::Paren(inner) => eval_aggregate(inner, group),
        Expr::Function { name, args } => match name.to_uppercase().as_str() {
            "SUM" => {
                let arg = args.first().ok_or_else(|| {
                    StorageError::Unsupported("SUM takes one argument".into())
                })?;
                let mut total = None;
                for row in group {
                    if let Some(n) = numeric(&eval(arg, row)?) {
                        *total.get_or_insert(0.0) += n;
                    }
                }
                Ok(total.map_or(Value::Null, |t| json!(t)))
            }
            "COUNT" => {
                let arg = args.first().ok_or_else(|| {
                    StorageError::Unsupported("COUNT takes one argument".into())
                })?;
                if matches!(arg, Expr::Star) {
                    return Ok(json!(group.len()));
                }
                let mut count = 0u64;
                for row in group {
                    if !eval(arg, row)?.is_null() {
                        count += 1;
                    }
                }
                Ok(json!(count))
            }
            other => Err(StorageError::Unsupported(format!(
                "aggregate function '{other}'"
            ))),
        },
        other => Err(StorageError::Unsupported(format!(
            "aggregate expression {other:?}"
        ))),
    }
}

/// Evaluate a scalar expression against one working row.
fn eval(expr: &Expr, row: &Scoped) -> Result<Value, StorageError> {
    match expr {
        Expr::Column { table, column } => match table {
            Some(qualifier) => row
                .get(&(qualifier.clone(), column.clone()))
                .cloned()
                .ok_or_else(|| StorageError::UnknownColumn {
                    table: qualifier.clone(),
                    column: column.clone(),
                }),
            None => {
                let mut matches = row.iter().filter(|((_, c), _)| c == column);
                match matches.next() {
                    Some((_, value)) => Ok(value.clone()),
                    None => Err(StorageError::UnknownColumn {
                        table: String::new(),
                        column: column.clone(),
                    }),
                }
            }
        },

        Expr::Literal(lit) => Ok(literal_to_value(lit)),

        Expr::BinaryOp { left, op, right } => {
            let l = eval(left, row)?;
            let r = eval(right, row)?;
            match op {
                BinaryOperator::Eq => Ok(json!(values_equal(&l, &r))),
                BinaryOperator::And => Ok(json!(truthy(&l)? && truthy(&r)?)),
                BinaryOperator::Or => Ok(json!(truthy(&l)? || truthy(&r)?)),
            }
        }

        Expr::Function { name, args } => match name.to_uppercase().as_str() {
            "SUBSTR" => {
                let value = eval(
                    args.first().ok_or_else(|| {
                        StorageError::Unsupported("SUBSTR takes three arguments".into())
                    })?,
                    row,
                )?;
                let (start, length) = match (args.get(1), args.get(2)) {
                    (
                        Some(Expr::Literal(Literal::Int(start))),
                        Some(Expr::Literal(Literal::Int(length))),
                    ) => (*start, *length),
                    _ => {
                        return Err(StorageError::Unsupported(
                            "SUBSTR bounds must be integer literals".into(),
                        ))
                    }
                };
                match value {
                    Value::Null => Ok(Value::Null),
                    Value::String(s) => {
                        let start = (start.max(1) - 1) as usize;
                        let out: String =
                            s.chars().skip(start).take(length.max(0) as usize).collect();
                        Ok(json!(out))
                    }
                    other => Err(StorageError::Unsupported(format!(
                        "SUBSTR over non-string value {other}"
                    ))),
                }
            }
            "SUM" | "COUNT" => Err(StorageError::Unsupported(
                "aggregate function in row context".into(),
            )),
            other => Err(StorageError::Unsupported(format!("function '{other}'"))),
        },

        Expr::Star => Err(StorageError::Unsupported(
            "bare * outside COUNT(*)".into(),
        )),

        Expr::Paren(inner) => eval(inner, row),
    }
}

fn literal_value(expr: &Expr) -> Result<Value, StorageError> {
    match expr {
        Expr::Literal(lit) => Ok(literal_to_value(lit)),
        other => Err(StorageError::Unsupported(format!(
            "expected a literal value, got {other:?}"
        ))),
    }
}

fn literal_to_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(n) => json!(n),
        Literal::Float(f) => json!(f),
        Literal::String(s) => json!(s),
        Literal::Bool(b) => json!(b),
        Literal::Null => Value::Null,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

/// Equality with numeric coercion: numbers compare numerically, and a
/// number compares against a numeric string the way a database coerces a
/// typed column against a text parameter.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x == y,
        (Some(x), None) => b.as_str().and_then(|s| s.parse::<f64>().ok()) == Some(x),
        (None, Some(y)) => a.as_str().and_then(|s| s.parse::<f64>().ok()) == Some(y),
        (None, None) => a == b,
    }
}

fn truthy(value: &Value) -> Result<bool, StorageError> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Null => Ok(false),
        other => Err(StorageError::Unsupported(format!(
            "non-boolean predicate value {other}"
        ))),
    }
}

/// Total order over cell values for ORDER BY: NULL first, then booleans,
/// numbers, strings.
fn compare_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;

    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
