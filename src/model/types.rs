//! Semantic data types for model fields and physical columns.

use serde::{Deserialize, Serialize};

/// The semantic type of a stored column.
///
/// `Id` is the 64-character content-hash key used for dimension members
/// and fact rows; everything else maps onto the obvious relational type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Id,
    String,
    Integer,
    Float,
    Bool,
    Date,
    Timestamp,
}

impl DataType {
    /// Parse a type name as written in a model description.
    ///
    /// Accepts the common aliases (`int`, `double`, `boolean`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "id" => Some(DataType::Id),
            "string" | "text" => Some(DataType::String),
            "integer" | "int" | "bigint" => Some(DataType::Integer),
            "float" | "double" | "decimal" | "numeric" => Some(DataType::Float),
            "bool" | "boolean" => Some(DataType::Bool),
            "date" => Some(DataType::Date),
            "timestamp" | "datetime" => Some(DataType::Timestamp),
            _ => None,
        }
    }
}
