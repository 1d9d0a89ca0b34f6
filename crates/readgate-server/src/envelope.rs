//! Uniform response envelope.
//!
//! Every `/execute` outcome and every gate rejection is reported in the same
//! JSON shape, on success and failure alike.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use readgate_query::{DataRow, ResultSet};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

use crate::error::GatewayError;

/// Body of every gateway response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "success": true,
    "data": [{ "id": 1, "name": "Acme" }],
    "rows_affected": 1,
    "execution_time_ms": 12,
    "request_id": "req-42"
}))]
pub struct ResponseEnvelope {
    /// Whether the query ran
    pub success: bool,
    /// Result rows, keys in column order
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Vec<Object>>)]
    pub data: Option<Vec<DataRow>>,
    /// Always the number of rows in `data`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<usize>,
    /// Human-readable failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Stable failure code
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "INVALID_QUERY_TYPE")]
    pub error_code: Option<String>,
    /// Wall time from body acceptance to response
    pub execution_time_ms: u64,
    /// Caller-supplied id, echoed verbatim
    pub request_id: String,
}

/// A response envelope paired with its HTTP status
#[derive(Debug, Clone)]
pub struct Envelope {
    pub status_code: StatusCode,
    pub body: ResponseEnvelope,
}

impl Envelope {
    pub fn success(rows: ResultSet, request_id: impl Into<String>, elapsed: Duration) -> Self {
        let rows = rows.into_rows();
        Self {
            status_code: StatusCode::OK,
            body: ResponseEnvelope {
                success: true,
                rows_affected: Some(rows.len()),
                data: Some(rows),
                error: None,
                error_code: None,
                execution_time_ms: elapsed.as_millis() as u64,
                request_id: request_id.into(),
            },
        }
    }

    pub fn failure(error: &GatewayError, request_id: impl Into<String>, elapsed: Duration) -> Self {
        Self {
            status_code: error.status_code(),
            body: ResponseEnvelope {
                success: false,
                data: None,
                rows_affected: None,
                error: Some(error.to_string()),
                error_code: Some(error.error_code().to_string()),
                execution_time_ms: elapsed.as_millis() as u64,
                request_id: request_id.into(),
            },
        }
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.status_code, Json(self.body)).into_response()
    }
}
