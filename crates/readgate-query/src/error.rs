use thiserror::Error;

use crate::types::Backend;

/// Unified error type for every stage of the query pipeline
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// Request body is not a JSON object
    #[error("Invalid request body: {0}")]
    InvalidRequest(String),

    /// Caller declared a backend other than the one this connector serves
    #[error("Database type mismatch. Connector is configured for {expected}, got {actual}")]
    BackendMismatch { expected: Backend, actual: String },

    /// Relational request without SQL text
    #[error("Query is required in request body")]
    MissingQuery,

    /// Document request without a resolvable collection
    #[error("Collection name is required")]
    MissingCollection,

    /// Query payload has the wrong shape
    #[error("Invalid query format: {0}")]
    InvalidQueryFormat(String),

    /// Statement stacking attempt
    #[error("Multiple statements are not allowed")]
    MultipleStatements,

    /// EXPLAIN over something other than SELECT/WITH
    #[error("Only EXPLAIN SELECT/WITH queries are allowed")]
    NonReadExplain,

    /// Statement does not start with a read keyword
    #[error("Only SELECT/WITH/EXPLAIN queries are allowed")]
    NotReadOnly,

    /// Document operation outside the read allow-list
    #[error("Only read operations are allowed: find, findone, count, countdocuments, aggregate")]
    OperationNotAllowed(String),

    /// Backend could not be reached
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Backend rejected the statement or operation
    #[error("{0}")]
    ExecutionFailed(String),

    /// Execution exceeded the requested bound
    #[error("Query timeout after {0}ms")]
    Timeout(u64),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueryError {
    /// Stable machine-readable code carried in the response envelope
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::InvalidRequest(_) => "INVALID_REQUEST",
            QueryError::BackendMismatch { .. } => "DATABASE_TYPE_MISMATCH",
            QueryError::MissingQuery => "MISSING_QUERY",
            QueryError::MissingCollection => "MISSING_COLLECTION",
            QueryError::InvalidQueryFormat(_) => "INVALID_QUERY_FORMAT",
            QueryError::MultipleStatements => "MULTIPLE_STATEMENTS",
            QueryError::NonReadExplain | QueryError::NotReadOnly => "INVALID_QUERY_TYPE",
            QueryError::OperationNotAllowed(_) => "INVALID_OPERATION",
            QueryError::ConnectionFailed(_)
            | QueryError::ExecutionFailed(_)
            | QueryError::Timeout(_) => "QUERY_EXECUTION_ERROR",
            QueryError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status the error maps to
    pub fn status_code(&self) -> u16 {
        if self.is_validation() {
            400
        } else {
            500
        }
    }

    /// True for failures caused by the request itself (HTTP 400)
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            QueryError::ConnectionFailed(_)
                | QueryError::ExecutionFailed(_)
                | QueryError::Timeout(_)
                | QueryError::Internal(_)
        )
    }

    /// Create an invalid query format error with custom message
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        QueryError::InvalidQueryFormat(msg.into())
    }

    /// Create a connection error with custom message
    pub fn connection(msg: impl Into<String>) -> Self {
        QueryError::ConnectionFailed(msg.into())
    }

    /// Create an execution error carrying the driver text verbatim
    pub fn execution(msg: impl Into<String>) -> Self {
        QueryError::ExecutionFailed(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, QueryError>;
