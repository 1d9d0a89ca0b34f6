//! Read-only safety checks.
//!
//! Relational statements are checked with a prefix/keyword heuristic, not a
//! parser: a single statement must start with `SELECT`, `WITH`, or
//! `EXPLAIN [ANALYZE] SELECT|WITH`. Constructs hidden inside an accepted
//! statement (writable CTEs, volatile functions, `SELECT ... INTO`, a `;`
//! inside a string literal) are not detected. The database credential is
//! expected to be read-only.
//!
//! Document operations must be in the read allow-list. Filters and
//! pipelines are passed through untouched.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::error::{QueryError, Result};
use crate::types::{
    DocumentOperation, DocumentPayload, DocumentQuery, Operation, QueryRequest,
    RawQuery, SqlStatement, StatementKind, ValidatedQuery,
};

static EXPLAIN_READ: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^EXPLAIN(\s+ANALYZE)?\s+(SELECT|WITH)\b").expect("static regex is valid")
});

/// Validate a normalized request and turn it into a `ValidatedQuery`
pub fn validate(request: QueryRequest) -> Result<ValidatedQuery> {
    let (backend, raw_query, request_id, timeout) = request.into_parts();

    let operation = match (backend.is_relational(), raw_query) {
        (true, RawQuery::Sql(text)) => Operation::Sql(validate_sql(&text)?),
        (false, RawQuery::Document(payload)) => Operation::Document(validate_document(payload)?),
        (_, RawQuery::Sql(_)) => {
            return Err(QueryError::invalid_format(format!(
                "{} expects a document query, got SQL text",
                backend
            )))
        }
        (_, RawQuery::Document(_)) => {
            return Err(QueryError::invalid_format(format!(
                "{} expects SQL text, got a document query",
                backend
            )))
        }
    };

    debug!(request_id = %request_id, backend = %backend, "Query passed safety validation");

    Ok(ValidatedQuery {
        backend,
        request_id,
        timeout,
        operation,
    })
}

/// Check that `text` is a single read-only SQL statement
pub fn validate_sql(text: &str) -> Result<SqlStatement> {
    let trimmed = text.trim();
    let statement = trimmed.strip_suffix(';').unwrap_or(trimmed);

    if statement.contains(';') {
        return Err(QueryError::MultipleStatements);
    }

    let upper = statement.to_uppercase();
    let kind = if upper.starts_with("EXPLAIN") {
        if !EXPLAIN_READ.is_match(&upper) {
            return Err(QueryError::NonReadExplain);
        }
        StatementKind::Explain
    } else if upper.starts_with("SELECT") {
        StatementKind::Select
    } else if upper.starts_with("WITH") {
        StatementKind::With
    } else {
        return Err(QueryError::NotReadOnly);
    };

    Ok(SqlStatement {
        text: statement.trim_end().to_string(),
        kind,
    })
}

/// Check that the document operation is a read
pub fn validate_document(payload: DocumentPayload) -> Result<DocumentQuery> {
    let operation = DocumentOperation::parse(&payload.operation)
        .ok_or_else(|| QueryError::OperationNotAllowed(payload.operation.clone()))?;

    Ok(DocumentQuery {
        collection: payload.collection,
        operation,
        filter: payload.filter,
        options: payload.options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Backend, DocumentOptions};
    use serde_json::json;
    use std::time::Duration;

    fn sql_request(backend: Backend, sql: &str) -> QueryRequest {
        QueryRequest::new(
            backend,
            RawQuery::Sql(sql.to_string()),
            "req-1",
            Duration::from_secs(30),
        )
    }

    fn doc_payload(operation: &str) -> DocumentPayload {
        DocumentPayload {
            collection: "orders".to_string(),
            operation: operation.to_string(),
            filter: json!({}),
            options: DocumentOptions::default(),
        }
    }

    #[test]
    fn test_plain_select_accepted() {
        let stmt = validate_sql("SELECT * FROM orders").unwrap();
        assert_eq!(stmt.kind(), StatementKind::Select);
        assert_eq!(stmt.text(), "SELECT * FROM orders");
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(validate_sql("select 1").unwrap().kind(), StatementKind::Select);
        assert_eq!(
            validate_sql("with t as (select 1) select * from t")
                .unwrap()
                .kind(),
            StatementKind::With
        );
        assert_eq!(
            validate_sql("explain analyze select 1").unwrap().kind(),
            StatementKind::Explain
        );
    }

    #[test]
    fn test_single_trailing_terminator_is_stripped() {
        let stmt = validate_sql("  SELECT 1;  ").unwrap();
        assert_eq!(stmt.text(), "SELECT 1");

        let stmt = validate_sql("SELECT 1 ;").unwrap();
        assert_eq!(stmt.text(), "SELECT 1");
    }

    #[test]
    fn test_statement_stacking_rejected() {
        assert_eq!(
            validate_sql("SELECT 1; DROP TABLE x"),
            Err(QueryError::MultipleStatements)
        );
        assert_eq!(
            validate_sql("SELECT 1; DROP TABLE x;"),
            Err(QueryError::MultipleStatements)
        );
        assert_eq!(validate_sql("SELECT 1;;"), Err(QueryError::MultipleStatements));
    }

    #[test]
    fn test_semicolon_in_literal_is_still_rejected() {
        // Heuristic: the check does not understand string literals.
        assert_eq!(
            validate_sql("SELECT 'a;b' AS v"),
            Err(QueryError::MultipleStatements)
        );
    }

    #[test]
    fn test_writes_rejected() {
        for sql in [
            "UPDATE t SET x=1",
            "INSERT INTO t VALUES (1)",
            "DELETE FROM t",
            "DROP TABLE t",
            "CREATE TABLE t (id int)",
            "TRUNCATE t",
            "SET statement_timeout = 0",
            ";",
        ] {
            assert_eq!(validate_sql(sql), Err(QueryError::NotReadOnly), "{}", sql);
        }
    }

    #[test]
    fn test_explain_forms() {
        assert!(validate_sql("EXPLAIN SELECT 1").is_ok());
        assert!(validate_sql("EXPLAIN ANALYZE SELECT 1").is_ok());
        assert!(validate_sql("EXPLAIN\n  WITH t AS (SELECT 1) SELECT * FROM t").is_ok());
        assert_eq!(
            validate_sql("EXPLAIN DELETE FROM t"),
            Err(QueryError::NonReadExplain)
        );
        assert_eq!(
            validate_sql("EXPLAIN ANALYZE UPDATE t SET x = 1"),
            Err(QueryError::NonReadExplain)
        );
        assert_eq!(
            validate_sql("EXPLAIN (FORMAT JSON) SELECT 1"),
            Err(QueryError::NonReadExplain)
        );
        assert_eq!(validate_sql("EXPLAINSELECT 1"), Err(QueryError::NonReadExplain));
    }

    #[test]
    fn test_prefix_semantics_preserved() {
        // Prefix match only, keyword boundaries are not checked.
        assert!(validate_sql("SELECTED_VIEW").is_ok());
        assert!(validate_sql("WITHOUT").is_ok());
    }

    #[test]
    fn test_validate_sql_request() {
        let validated = validate(sql_request(Backend::MySql, "SELECT 1;")).unwrap();
        assert_eq!(validated.backend(), Backend::MySql);
        assert_eq!(validated.request_id(), "req-1");
        match validated.operation() {
            Operation::Sql(stmt) => assert_eq!(stmt.text(), "SELECT 1"),
            other => panic!("unexpected operation: {:?}", other),
        }
    }

    #[test]
    fn test_document_allow_list() {
        for op in ["find", "findOne", "count", "countDocuments", "aggregate", "FIND"] {
            assert!(validate_document(doc_payload(op)).is_ok(), "{}", op);
        }
        for op in ["insertOne", "updateMany", "deleteOne", "drop", "mapReduce", ""] {
            assert_eq!(
                validate_document(doc_payload(op)),
                Err(QueryError::OperationNotAllowed(op.to_string())),
                "{}",
                op
            );
        }
    }

    #[test]
    fn test_document_filter_passes_through() {
        let mut payload = doc_payload("aggregate");
        payload.filter = json!([{ "$match": { "status": "paid" } }, { "$out": "copy" }]);
        let query = validate_document(payload.clone()).unwrap();
        assert_eq!(query.filter(), &payload.filter);
        assert_eq!(query.operation(), DocumentOperation::Aggregate);
    }

    #[test]
    fn test_shape_mismatch_rejected() {
        let request = QueryRequest::new(
            Backend::MongoDb,
            RawQuery::Sql("SELECT 1".into()),
            "r",
            Duration::from_secs(1),
        );
        assert!(matches!(
            validate(request),
            Err(QueryError::InvalidQueryFormat(_))
        ));

        let request = QueryRequest::new(
            Backend::Postgres,
            RawQuery::Document(doc_payload("find")),
            "r",
            Duration::from_secs(1),
        );
        assert!(matches!(
            validate(request),
            Err(QueryError::InvalidQueryFormat(_))
        ));
    }
}
