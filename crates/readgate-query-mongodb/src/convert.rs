//! BSON and JSON conversion.
//!
//! Inbound filters, pipelines, sorts and projections are read as MongoDB
//! extended JSON, so `{"$oid": "..."}` and `{"$date": "..."}` reach the
//! server as typed values. Outbound documents use plain JSON: every ObjectId
//! becomes its 24-hex-digit string and dates become RFC 3339 text.

use bson::{Bson, Document};
use readgate_query::{ColumnInfo, DataRow, QueryError, Result};
use serde_json::Value;

/// Read a JSON object as an extended-JSON BSON document.
///
/// `null` is an empty document.
pub fn json_to_document(value: &Value, what: &str) -> Result<Document> {
    match value {
        Value::Null => Ok(Document::new()),
        Value::Object(_) => match Bson::try_from(value.clone()) {
            Ok(Bson::Document(doc)) => Ok(doc),
            Ok(_) => Err(QueryError::invalid_format(format!(
                "{} must be a JSON object",
                what
            ))),
            Err(e) => Err(QueryError::invalid_format(format!("invalid {}: {}", what, e))),
        },
        _ => Err(QueryError::invalid_format(format!(
            "{} must be a JSON object",
            what
        ))),
    }
}

/// Read an aggregation pipeline. Anything that is not an array is an empty
/// pipeline.
pub fn json_to_pipeline(value: &Value) -> Result<Vec<Document>> {
    match value {
        Value::Array(stages) => stages
            .iter()
            .map(|stage| match stage {
                Value::Object(_) => json_to_document(stage, "pipeline stage"),
                _ => Err(QueryError::invalid_format(
                    "pipeline stages must be JSON objects",
                )),
            })
            .collect(),
        _ => Ok(Vec::new()),
    }
}

/// Convert a BSON value into plain JSON
pub fn bson_to_json(value: Bson) -> Value {
    match value {
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        Bson::DateTime(dt) => match dt.try_to_rfc3339_string() {
            Ok(text) => Value::String(text),
            Err(_) => Value::Number(dt.timestamp_millis().into()),
        },
        Bson::Document(doc) => Value::Object(document_to_row(doc)),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_json).collect()),
        Bson::String(s) => Value::String(s),
        Bson::Boolean(b) => Value::Bool(b),
        Bson::Int32(n) => Value::Number(n.into()),
        Bson::Int64(n) => Value::Number(n.into()),
        Bson::Double(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        Bson::Binary(bin) => Value::String(hex::encode(bin.bytes)),
        Bson::Null | Bson::Undefined => Value::Null,
        other => other.into_relaxed_extjson(),
    }
}

/// Convert a document into a row, keeping field order
pub fn document_to_row(doc: Document) -> DataRow {
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_json(value)))
        .collect()
}

/// JSON type name of a converted value
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Top-level fields of a sampled document, in document order
pub fn sample_columns(row: &DataRow) -> Vec<ColumnInfo> {
    row.iter()
        .map(|(name, value)| ColumnInfo::new(name.as_str(), json_type_name(value), true))
        .collect()
}
