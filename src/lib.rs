//! # Abacus
//!
//! A star-schema cube engine for slicing and aggregating monetary
//! datasets.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │           Model description (declarative JSON)           │
//! │        (dataset metadata, measures, dimensions)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [model]
//! ┌─────────────────────────────────────────────────────────┐
//! │              CubeModel (typed field variants)            │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [schema]
//! ┌─────────────────────────────────────────────────────────┐
//! │      SchemaBinding (fact + dimension tables, joins)      │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!              ┌───────────┴───────────┐
//!              ▼ [cube: load]          ▼ [cube: aggregate]
//! ┌──────────────────────┐  ┌──────────────────────────────┐
//! │  Upserting DML plans │  │  Three-stage query plans     │
//! └──────────────────────┘  └──────────────────────────────┘
//!                          │
//!                          ▼ [store]
//! ┌─────────────────────────────────────────────────────────┐
//! │   StorageExecutor (MemoryStore, or any SQL backend)      │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Row identity is content-hash based throughout: dimension members are
//! keyed by the hash of their attribute values, fact rows by the
//! order-independent hash of the full source record, so loading is
//! idempotent and identifiers are stable across reloads.

pub mod cube;
pub mod error;
pub mod hash;
pub mod model;
pub mod schema;
pub mod sql;
pub mod store;

// Re-export SQL submodules at crate level for convenient paths.
pub use sql::ddl;
pub use sql::dialect;
pub use sql::dml;
pub use sql::expr;
pub use sql::query;
pub use sql::token;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::cube::{AggregateRequest, AggregateResult, AggregateSummary, Cube, Entries};
    pub use crate::error::{CubeError, CubeResult};
    pub use crate::model::{CubeModel, DataType, Dataset, Field, ResolvedKey, TimeLabel};
    pub use crate::schema::SchemaBinding;
    pub use crate::sql::{Dialect, SqlDialect};
    pub use crate::store::{MemoryStore, Row, StorageError, StorageExecutor};
}

// Also export the main entry points at the crate root.
pub use cube::{AggregateRequest, AggregateResult, Cube};
pub use error::{CubeError, CubeResult};
pub use model::CubeModel;
pub use store::{MemoryStore, StorageExecutor};
