//! DuckDB dialect.
//!
//! PostgreSQL-compatible for everything the cube engine emits. DuckDB has
//! no fixed-length CHAR, so hash keys render as VARCHAR.

use super::SqlDialect;
use crate::model::DataType;

/// DuckDB SQL dialect.
#[derive(Debug, Clone, Copy)]
pub struct DuckDb;

impl SqlDialect for DuckDb {
    fn name(&self) -> &'static str {
        "duckdb"
    }

    fn emit_data_type(&self, dt: DataType) -> String {
        match dt {
            DataType::Id => "VARCHAR".into(),
            DataType::String => "VARCHAR".into(),
            DataType::Integer => "BIGINT".into(),
            DataType::Float => "DOUBLE PRECISION".into(),
            DataType::Bool => "BOOLEAN".into(),
            DataType::Date => "DATE".into(),
            DataType::Timestamp => "TIMESTAMP".into(),
        }
    }
}
