//! Error taxonomy for the cube engine.
//!
//! Every failure carries enough context (field name, table, stage) to
//! diagnose without a debugger. Nothing is swallowed; the only built-in
//! recovery is the loader's single-retry dimension upsert.

use thiserror::Error;

use crate::store::StorageError;

/// Errors surfaced by the cube engine.
#[derive(Debug, Error)]
pub enum CubeError {
    /// A drilldown, cut or order key does not resolve in the model.
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// A structurally invalid drilldown/cut/order combination.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The operation requires a physical schema that has not been
    /// generated yet. Recoverable by calling `generate()`.
    #[error("Dataset '{0}' has no generated schema")]
    NotGenerated(String),

    /// A single input record failed transformation. Already-committed
    /// rows are unaffected.
    #[error("Failed to load entry (field '{field}'): {reason}")]
    Load { field: String, reason: String },

    /// An existing physical table is incompatible with the current
    /// model. Requires manual migration; never silently patched.
    #[error("Schema conflict on table '{table}': {reason}")]
    SchemaConflict { table: String, reason: String },

    /// The model description itself is invalid.
    #[error("Invalid model: {0}")]
    Model(String),

    /// An error reported by the storage executor.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CubeError {
    /// Shorthand for a per-record load failure.
    pub fn load(field: impl Into<String>, reason: impl Into<String>) -> Self {
        CubeError::Load {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type CubeResult<T> = Result<T, CubeError>;
