//! The relational plan language the cube engine compiles to.
//!
//! Statements are typed ASTs, not SQL strings: storage executors consume
//! them directly (the bundled in-memory store interprets them), and
//! SQL-backed executors serialize them through [`dialect`].
//!
//! - [`query`] - SELECT query builder
//! - [`expr`] - expression AST and builder DSL
//! - [`ddl`] - CREATE/DROP/TRUNCATE TABLE
//! - [`dml`] - INSERT (with conflict handling), UPDATE, DELETE
//! - [`token`] - token types for SQL serialization
//! - [`dialect`] - SQL dialect implementations

pub mod ddl;
pub mod dialect;
pub mod dml;
pub mod expr;
pub mod query;
pub mod token;

pub use dialect::{Dialect, SqlDialect};
pub use expr::{
    col, count, count_star, lit_float, lit_int, lit_str, lit_value, substr, sum, table_col,
    BinaryOperator, Expr, ExprExt, Literal,
};
pub use query::{
    FromItem, Join, JoinType, LimitOffset, OrderByExpr, Query, SelectExpr, SortDir, TableRef,
};
pub use token::{Token, TokenStream};

pub use ddl::{ColumnDef, CreateTable, DdlStatement, DropTable, TableConstraint, Truncate};
pub use dml::{Delete, Insert, OnConflict, Update};
