use crate::error::{QueryError, Result};
use crate::schema::SchemaInfo;
use crate::types::{Backend, QueryRequest, ResultSet, ValidatedQuery};
use crate::validator;
use async_trait::async_trait;
use std::time::Duration;

/// Core trait every backend adapter implements.
///
/// An adapter owns its connection settings and opens a fresh connection per
/// call. Nothing is shared between requests, so the gateway can run many
/// requests at once without synchronizing on the adapter.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Backend this adapter serves
    fn backend(&self) -> Backend;

    /// Run the safety validator for this backend
    fn validate(&self, request: QueryRequest) -> Result<ValidatedQuery> {
        if request.backend() != self.backend() {
            return Err(QueryError::BackendMismatch {
                expected: self.backend(),
                actual: request.backend().to_string(),
            });
        }
        validator::validate(request)
    }

    /// Execute a validated read, bounded by `timeout`.
    ///
    /// The connection opened for the call is released on every path,
    /// including timeout and driver errors.
    async fn execute(&self, query: &ValidatedQuery, timeout: Duration) -> Result<ResultSet>;

    /// Cheap liveness check used by the health endpoint
    async fn ping(&self) -> Result<()>;

    /// Describe the tables (or collections) the credential can read,
    /// bounded by `timeout`. Catalog reads only.
    async fn introspect(&self, timeout: Duration) -> Result<SchemaInfo>;
}
