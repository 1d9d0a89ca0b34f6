//! Turns an `/execute` body into a canonical `QueryRequest`.
//!
//! Relational bodies carry SQL text in `query`. Document bodies carry a
//! `{collection, operation, filter, options}` payload, either nested in
//! `query` (as an object or a JSON-encoded string) or flat at the top level
//! of the body, where `query` is an alias of `filter`.

use serde_json::{Map, Value};
use std::time::Duration;

use crate::error::{QueryError, Result};
use crate::types::{Backend, DocumentOptions, DocumentPayload, QueryRequest, RawQuery};

/// Default per-request timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Default document operation when the caller names none
pub const DEFAULT_OPERATION: &str = "find";

/// Read `request_id` from a body, echoing non-string values as JSON text
pub fn request_id_of(body: &Value) -> String {
    match body.get("request_id") {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
    }
}

/// Check the declared `database_type` against the configured backend.
///
/// An absent declaration means the configured backend.
pub fn check_backend(configured: Backend, body: &Value) -> Result<()> {
    match present(body.get("database_type")) {
        None => Ok(()),
        Some(Value::String(declared)) if declared == configured.as_str() => Ok(()),
        Some(Value::String(declared)) => Err(QueryError::BackendMismatch {
            expected: configured,
            actual: declared.clone(),
        }),
        Some(other) => Err(QueryError::BackendMismatch {
            expected: configured,
            actual: other.to_string(),
        }),
    }
}

/// Normalize a request body for the configured backend
pub fn normalize(configured: Backend, body: &Value) -> Result<QueryRequest> {
    let fields = body.as_object().ok_or_else(|| {
        QueryError::InvalidRequest("request body must be a JSON object".to_string())
    })?;

    check_backend(configured, body)?;

    let raw_query = if configured.is_relational() {
        RawQuery::Sql(sql_text(fields)?)
    } else {
        RawQuery::Document(document_payload(fields)?)
    };

    Ok(QueryRequest::new(
        configured,
        raw_query,
        request_id_of(body),
        timeout_of(fields),
    ))
}

fn timeout_of(fields: &Map<String, Value>) -> Duration {
    let ms = fields
        .get("timeout_ms")
        .and_then(Value::as_u64)
        .filter(|ms| *ms > 0)
        .unwrap_or(DEFAULT_TIMEOUT_MS);
    Duration::from_millis(ms)
}

fn sql_text(fields: &Map<String, Value>) -> Result<String> {
    match present(fields.get("query")) {
        None => Err(QueryError::MissingQuery),
        Some(Value::String(text)) => {
            let text = text.trim();
            if text.is_empty() {
                Err(QueryError::MissingQuery)
            } else {
                Ok(text.to_string())
            }
        }
        Some(_) => Err(QueryError::invalid_format(
            "query must be a SQL string",
        )),
    }
}

fn document_payload(fields: &Map<String, Value>) -> Result<DocumentPayload> {
    let decoded = match present(fields.get("query")) {
        None => None,
        Some(Value::String(text)) => Some(serde_json::from_str::<Value>(text).map_err(|_| {
            QueryError::invalid_format(
                "Invalid query format. Expected JSON with collection and operation",
            )
        })?),
        Some(value) => Some(value.clone()),
    };

    // Nested shape: the decoded query names the collection itself.
    if let Some(Value::Object(nested)) = &decoded {
        if present(nested.get("collection")).is_some() {
            let filter = present(nested.get("filter")).or_else(|| present(nested.get("query")));
            return build_payload(
                nested.get("collection"),
                nested.get("operation"),
                filter,
                nested.get("options"),
            );
        }
    }

    // Flat shape: fields on the body, the decoded query is the filter alias.
    let filter = present(fields.get("filter")).or(decoded.as_ref().and_then(|v| present(Some(v))));
    build_payload(
        fields.get("collection"),
        fields.get("operation"),
        filter,
        fields.get("options"),
    )
}

fn build_payload(
    collection: Option<&Value>,
    operation: Option<&Value>,
    filter: Option<&Value>,
    options: Option<&Value>,
) -> Result<DocumentPayload> {
    let collection = match present(collection) {
        Some(Value::String(name)) if !name.trim().is_empty() => name.trim().to_string(),
        Some(Value::String(_)) | None => return Err(QueryError::MissingCollection),
        Some(_) => return Err(QueryError::invalid_format("collection must be a string")),
    };

    let operation = match present(operation) {
        None => DEFAULT_OPERATION.to_string(),
        Some(Value::String(op)) => op.trim().to_string(),
        Some(_) => return Err(QueryError::invalid_format("operation must be a string")),
    };

    let options = match present(options) {
        None => DocumentOptions::default(),
        Some(value) => serde_json::from_value::<DocumentOptions>(value.clone())
            .map_err(|e| QueryError::invalid_format(format!("invalid options: {}", e)))?,
    };

    Ok(DocumentPayload {
        collection,
        operation,
        filter: filter
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new())),
        options,
    })
}

/// Treat JSON `null` like a missing field
fn present(value: Option<&Value>) -> Option<&Value> {
    value.filter(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document(body: Value) -> DocumentPayload {
        match normalize(Backend::MongoDb, &body).unwrap().raw_query() {
            RawQuery::Document(payload) => payload.clone(),
            other => panic!("expected document payload, got {:?}", other),
        }
    }

    #[test]
    fn test_sql_is_trimmed() {
        let body = json!({
            "database_type": "postgresql",
            "query": "  SELECT 1  ",
            "query_type": "SELECT",
            "request_id": "abc",
        });
        let request = normalize(Backend::Postgres, &body).unwrap();
        assert_eq!(request.raw_query(), &RawQuery::Sql("SELECT 1".to_string()));
        assert_eq!(request.request_id(), "abc");
        assert_eq!(request.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_missing_sql() {
        for body in [
            json!({ "database_type": "mysql" }),
            json!({ "database_type": "mysql", "query": null }),
            json!({ "database_type": "mysql", "query": "   " }),
        ] {
            assert_eq!(
                normalize(Backend::MySql, &body),
                Err(QueryError::MissingQuery)
            );
        }
    }

    #[test]
    fn test_sql_must_be_text() {
        let body = json!({ "query": { "select": 1 } });
        assert!(matches!(
            normalize(Backend::MySql, &body),
            Err(QueryError::InvalidQueryFormat(_))
        ));
    }

    #[test]
    fn test_backend_mismatch_checked_first() {
        let body = json!({ "database_type": "mysql", "request_id": "r1" });
        assert_eq!(
            normalize(Backend::Postgres, &body),
            Err(QueryError::BackendMismatch {
                expected: Backend::Postgres,
                actual: "mysql".to_string()
            })
        );
    }

    #[test]
    fn test_absent_backend_defaults_to_configured() {
        let body = json!({ "query": "SELECT 1" });
        assert!(normalize(Backend::MySql, &body).is_ok());
    }

    #[test]
    fn test_timeout() {
        let body = json!({ "query": "SELECT 1", "timeout_ms": 1500 });
        let request = normalize(Backend::Postgres, &body).unwrap();
        assert_eq!(request.timeout(), Duration::from_millis(1500));

        let body = json!({ "query": "SELECT 1", "timeout_ms": 0 });
        let request = normalize(Backend::Postgres, &body).unwrap();
        assert_eq!(request.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_request_id_echo() {
        assert_eq!(request_id_of(&json!({ "request_id": "Ünïcode-✓ " })), "Ünïcode-✓ ");
        assert_eq!(request_id_of(&json!({ "request_id": 42 })), "42");
        assert_eq!(request_id_of(&json!({})), "");
        assert_eq!(request_id_of(&json!("not an object")), "");
    }

    #[test]
    fn test_non_object_body() {
        assert!(matches!(
            normalize(Backend::Postgres, &json!(["SELECT 1"])),
            Err(QueryError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_document_from_json_string() {
        let payload = document(json!({
            "database_type": "mongodb",
            "query": "{\"collection\": \"tenants\", \"operation\": \"find\", \"filter\": {\"active\": true}}",
        }));
        assert_eq!(payload.collection, "tenants");
        assert_eq!(payload.operation, "find");
        assert_eq!(payload.filter, json!({ "active": true }));
    }

    #[test]
    fn test_document_from_nested_object_with_query_alias() {
        let payload = document(json!({
            "query": {
                "collection": "orders",
                "operation": "countDocuments",
                "query": { "status": "paid" },
                "options": { "limit": 5 },
            },
        }));
        assert_eq!(payload.collection, "orders");
        assert_eq!(payload.operation, "countDocuments");
        assert_eq!(payload.filter, json!({ "status": "paid" }));
        assert_eq!(payload.options.limit, Some(5));
    }

    #[test]
    fn test_document_flat_shape() {
        let payload = document(json!({
            "collection": "orders",
            "operation": "aggregate",
            "filter": [{ "$match": { "status": "paid" } }],
        }));
        assert_eq!(payload.collection, "orders");
        assert_eq!(payload.operation, "aggregate");
        assert_eq!(payload.filter, json!([{ "$match": { "status": "paid" } }]));
    }

    #[test]
    fn test_document_flat_shape_query_is_filter_alias() {
        let payload = document(json!({
            "collection": "orders",
            "query": { "status": "open" },
        }));
        assert_eq!(payload.operation, DEFAULT_OPERATION);
        assert_eq!(payload.filter, json!({ "status": "open" }));
    }

    #[test]
    fn test_document_defaults() {
        let payload = document(json!({ "collection": "orders" }));
        assert_eq!(payload.operation, "find");
        assert_eq!(payload.filter, json!({}));
        assert_eq!(payload.options, DocumentOptions::default());
    }

    #[test]
    fn test_document_missing_collection() {
        for body in [
            json!({}),
            json!({ "query": "{\"operation\": \"find\"}" }),
            json!({ "collection": "" }),
            json!({ "query": { "collection": null }, "collection": "  " }),
        ] {
            assert_eq!(
                normalize(Backend::MongoDb, &body),
                Err(QueryError::MissingCollection),
                "{}",
                body
            );
        }
    }

    #[test]
    fn test_document_bad_json_string() {
        let body = json!({ "query": "{collection: orders" });
        assert!(matches!(
            normalize(Backend::MongoDb, &body),
            Err(QueryError::InvalidQueryFormat(_))
        ));
    }

    #[test]
    fn test_document_bad_options() {
        let body = json!({ "collection": "orders", "options": { "limit": "ten" } });
        assert!(matches!(
            normalize(Backend::MongoDb, &body),
            Err(QueryError::InvalidQueryFormat(_))
        ));
    }
}
