//! # readgate-query
//!
//! Core of the read-only query gateway: request normalization, the safety
//! validator, and the adapter abstraction the executors implement.
//!
//! Supported backends:
//! - PostgreSQL (SQL)
//! - MySQL (SQL)
//! - MongoDB (Document)
//!
//! ## Pipeline
//!
//! - **normalize**: JSON body to a canonical `QueryRequest`
//! - **validator**: `QueryRequest` to a `ValidatedQuery`, rejecting anything
//!   that is not a single read
//! - **BackendAdapter**: executes a `ValidatedQuery` and returns a `ResultSet`,
//!   and describes the readable tables as a `SchemaInfo`
//!
//! ## Example
//!
//! ```rust
//! use readgate_query::{normalize, validator, Backend, Operation};
//! use serde_json::json;
//!
//! let body = json!({ "database_type": "postgresql", "query": "SELECT 1;" });
//! let request = normalize::normalize(Backend::Postgres, &body).unwrap();
//! let validated = validator::validate(request).unwrap();
//! assert!(matches!(validated.operation(), Operation::Sql(_)));
//! ```
//!
//! Backend crates:
//! - `readgate-query-postgres`
//! - `readgate-query-mysql`
//! - `readgate-query-mongodb`

pub mod error;
pub mod normalize;
pub mod registry;
pub mod schema;
pub mod traits;
pub mod types;
pub mod validator;

// Re-export commonly used items
pub use error::{QueryError, Result};
pub use normalize::DEFAULT_TIMEOUT_MS;
pub use registry::{AdapterFactory, AdapterRegistry, ConnectionConfig};
pub use schema::{ColumnInfo, SchemaInfo, TableInfo};
pub use traits::BackendAdapter;
pub use types::{
    Backend, DataRow, DocumentOperation, DocumentOptions, DocumentPayload, DocumentQuery,
    Operation, QueryRequest, RawQuery, ResultSet, SqlStatement, StatementKind, ValidatedQuery,
};
