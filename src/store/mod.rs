//! Storage executor contract.
//!
//! The engine compiles plans; an executor runs them. The contract is
//! relational capability, not SQL text: executors receive plan-AST values
//! and return row sets. The bundled [`MemoryStore`] interprets the AST
//! directly; a SQL-backed executor would serialize through
//! [`crate::sql::dialect`] instead.

pub mod memory;

pub use memory::MemoryStore;

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::sql::{CreateTable, Delete, DropTable, Insert, Query, Truncate, Update};

/// One result row: output name to cell value.
pub type Row = BTreeMap<String, Value>;

/// Errors reported by a storage executor.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A statement referenced a table the store does not have.
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    /// A statement referenced a column the table does not have.
    #[error("Unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// An insert violated a key's uniqueness. The loader relies on this
    /// being distinguishable to apply its reread fallback.
    #[error("Unique violation on '{table}.{column}'")]
    UniqueViolation { table: String, column: String },

    /// The executor was handed a plan shape it cannot run.
    #[error("Unsupported plan: {0}")]
    Unsupported(String),

    /// A backend-specific failure (connection lost, disk full, ...).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// A relational execution capability.
///
/// Implementations must provide numeric sum/count aggregation, equality
/// predicates with AND/OR composition, group-by, order-by, limit/offset
/// and table aliasing - the shapes the cube engine compiles to.
pub trait StorageExecutor {
    /// Execute a CREATE TABLE statement.
    fn create_table(&mut self, stmt: &CreateTable) -> Result<(), StorageError>;

    /// Execute a DROP TABLE statement.
    fn drop_table(&mut self, stmt: &DropTable) -> Result<(), StorageError>;

    /// Empty a table, keeping its structure.
    fn truncate(&mut self, stmt: &Truncate) -> Result<(), StorageError>;

    /// Execute an INSERT; returns the number of rows written.
    fn insert(&mut self, stmt: &Insert) -> Result<u64, StorageError>;

    /// Execute an UPDATE; returns the number of rows changed.
    fn update(&mut self, stmt: &Update) -> Result<u64, StorageError>;

    /// Execute a DELETE; returns the number of rows removed.
    fn delete(&mut self, stmt: &Delete) -> Result<u64, StorageError>;

    /// Run a query and return its rows.
    fn fetch(&self, query: &Query) -> Result<Vec<Row>, StorageError>;

    /// Whether a table exists.
    fn table_exists(&self, table: &str) -> Result<bool, StorageError>;

    /// The column names of a table, in declaration order.
    fn table_columns(&self, table: &str) -> Result<Vec<String>, StorageError>;
}
