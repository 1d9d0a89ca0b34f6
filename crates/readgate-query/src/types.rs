use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::QueryError;

/// Database backend a connector instance serves
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Backend {
    /// PostgreSQL (SQL)
    #[serde(rename = "postgresql")]
    Postgres,
    /// MySQL (SQL)
    #[serde(rename = "mysql")]
    MySql,
    /// MongoDB (Document)
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl Backend {
    /// Wire name used in `database_type`
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Postgres => "postgresql",
            Backend::MySql => "mysql",
            Backend::MongoDb => "mongodb",
        }
    }

    /// Whether the backend takes raw SQL text
    pub fn is_relational(&self) -> bool {
        matches!(self, Backend::Postgres | Backend::MySql)
    }

    /// Infer the backend from a connection string scheme
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split_once("://")?.0.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Backend::Postgres),
            "mysql" => Some(Backend::MySql),
            "mongodb" | "mongodb+srv" => Some(Backend::MongoDb),
            _ => None,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Backend {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "postgresql" => Ok(Backend::Postgres),
            "mysql" => Ok(Backend::MySql),
            "mongodb" => Ok(Backend::MongoDb),
            other => Err(QueryError::InvalidRequest(format!(
                "Unknown database type: {}",
                other
            ))),
        }
    }
}

/// Options accepted on document reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentOptions {
    /// Maximum documents returned by `find` (default 100)
    pub limit: Option<i64>,
    /// Documents to skip
    pub skip: Option<u64>,
    /// Sort specification
    pub sort: Option<serde_json::Value>,
    /// Field projection
    pub projection: Option<serde_json::Value>,
}

/// Document request before validation
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPayload {
    pub collection: String,
    pub operation: String,
    pub filter: serde_json::Value,
    pub options: DocumentOptions,
}

/// Backend-specific query body
#[derive(Debug, Clone, PartialEq)]
pub enum RawQuery {
    /// SQL text (relational backends)
    Sql(String),
    /// Structured payload (document backend)
    Document(DocumentPayload),
}

/// Canonical, not yet validated request
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    backend: Backend,
    raw_query: RawQuery,
    request_id: String,
    timeout: Duration,
}

impl QueryRequest {
    pub fn new(
        backend: Backend,
        raw_query: RawQuery,
        request_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            raw_query,
            request_id: request_id.into(),
            timeout,
        }
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn raw_query(&self) -> &RawQuery {
        &self.raw_query
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn into_parts(self) -> (Backend, RawQuery, String, Duration) {
        (self.backend, self.raw_query, self.request_id, self.timeout)
    }
}

/// Leading keyword of an accepted SQL statement
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum StatementKind {
    Select,
    With,
    /// Plan rows are returned instead of query rows
    Explain,
}

/// Read-only SQL statement, single statement, trailing terminator removed
#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub(crate) text: String,
    pub(crate) kind: StatementKind,
}

impl SqlStatement {
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }
}

/// Allow-listed document operations
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DocumentOperation {
    Find,
    FindOne,
    Count,
    CountDocuments,
    Aggregate,
}

impl DocumentOperation {
    /// Case-insensitive lookup in the read allow-list
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "find" => Some(DocumentOperation::Find),
            "findone" => Some(DocumentOperation::FindOne),
            "count" => Some(DocumentOperation::Count),
            "countdocuments" => Some(DocumentOperation::CountDocuments),
            "aggregate" => Some(DocumentOperation::Aggregate),
            _ => None,
        }
    }
}

impl fmt::Display for DocumentOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentOperation::Find => write!(f, "find"),
            DocumentOperation::FindOne => write!(f, "findOne"),
            DocumentOperation::Count => write!(f, "count"),
            DocumentOperation::CountDocuments => write!(f, "countDocuments"),
            DocumentOperation::Aggregate => write!(f, "aggregate"),
        }
    }
}

/// Validated document read
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentQuery {
    pub(crate) collection: String,
    pub(crate) operation: DocumentOperation,
    pub(crate) filter: serde_json::Value,
    pub(crate) options: DocumentOptions,
}

impl DocumentQuery {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn operation(&self) -> DocumentOperation {
        self.operation
    }

    /// Filter document, or the pipeline for `aggregate`
    pub fn filter(&self) -> &serde_json::Value {
        &self.filter
    }

    pub fn options(&self) -> &DocumentOptions {
        &self.options
    }
}

/// Normalized operation descriptor of a validated query
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Sql(SqlStatement),
    Document(DocumentQuery),
}

/// A request that passed the safety validator.
///
/// Only `validator::validate` can build one, so holding a `ValidatedQuery`
/// means the operation is a single read.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedQuery {
    pub(crate) backend: Backend,
    pub(crate) request_id: String,
    pub(crate) timeout: Duration,
    pub(crate) operation: Operation,
}

impl ValidatedQuery {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    /// Timeout in whole milliseconds, never below 1
    pub fn timeout_ms(&self) -> u64 {
        (self.timeout.as_millis() as u64).max(1)
    }
}

/// A row of data as ordered key-value pairs
pub type DataRow = serde_json::Map<String, serde_json::Value>;

/// Rows produced by an executor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    rows: Vec<DataRow>,
}

impl ResultSet {
    pub fn new(rows: Vec<DataRow>) -> Self {
        Self { rows }
    }

    /// Single synthetic row, e.g. `{count: N}`
    pub fn single(row: DataRow) -> Self {
        Self { rows: vec![row] }
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[DataRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<DataRow> {
        self.rows
    }
}

impl From<Vec<DataRow>> for ResultSet {
    fn from(rows: Vec<DataRow>) -> Self {
        Self::new(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_wire_names() {
        assert_eq!(Backend::Postgres.to_string(), "postgresql");
        assert_eq!("mysql".parse::<Backend>().unwrap(), Backend::MySql);
        assert!("postgres".parse::<Backend>().is_err());
        assert!(Backend::MySql.is_relational());
        assert!(!Backend::MongoDb.is_relational());
    }

    #[test]
    fn test_backend_from_url() {
        assert_eq!(
            Backend::from_url("postgresql://u:p@localhost:5432/db"),
            Some(Backend::Postgres)
        );
        assert_eq!(
            Backend::from_url("postgres://localhost/db"),
            Some(Backend::Postgres)
        );
        assert_eq!(
            Backend::from_url("mysql://u:p@host:3306/db"),
            Some(Backend::MySql)
        );
        assert_eq!(
            Backend::from_url("mongodb+srv://cluster0.example.net/app"),
            Some(Backend::MongoDb)
        );
        assert_eq!(Backend::from_url("https://example.com"), None);
        assert_eq!(Backend::from_url("not a url"), None);
    }

    #[test]
    fn test_document_operation_allow_list() {
        assert_eq!(
            DocumentOperation::parse("countDocuments"),
            Some(DocumentOperation::CountDocuments)
        );
        assert_eq!(
            DocumentOperation::parse("FINDONE"),
            Some(DocumentOperation::FindOne)
        );
        assert_eq!(DocumentOperation::parse("insertOne"), None);
        assert_eq!(DocumentOperation::parse("deleteMany"), None);
    }

    #[test]
    fn test_result_set_serializes_as_array() {
        let mut row = DataRow::new();
        row.insert("count".to_string(), serde_json::json!(3));
        let set = ResultSet::single(row);
        assert_eq!(set.count(), 1);
        assert_eq!(
            serde_json::to_value(&set).unwrap(),
            serde_json::json!([{ "count": 3 }])
        );
    }
}
