//! Application state and request/response types for gateway handlers

use std::sync::Arc;
use std::time::Duration;

use readgate_query::{Backend, BackendAdapter, SchemaInfo};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::config::GatewayConfig;
use crate::gate::AccessGate;

/// Shared, immutable state for every request
pub struct GatewayState {
    pub config: GatewayConfig,
    pub gate: AccessGate,
    pub adapter: Arc<dyn BackendAdapter>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, adapter: Arc<dyn BackendAdapter>) -> Self {
        Self {
            gate: AccessGate::new(&config),
            config,
            adapter,
        }
    }

    pub fn backend(&self) -> Backend {
        self.config.backend()
    }
}

// =============================================================================
// Request Types
// =============================================================================

/// Body of `POST /execute`.
///
/// Documentation only: the handler reads the raw body so that malformed
/// JSON still gets an envelope.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[allow(dead_code)]
pub struct ExecuteRequest {
    /// Must match the connector's backend when present
    #[schema(example = "postgresql")]
    pub database_type: Option<String>,
    /// SQL text, or a document query as an object or JSON-encoded string
    #[schema(value_type = Object, example = "SELECT id, name FROM customers LIMIT 10")]
    pub query: Option<Value>,
    /// Informational
    #[schema(example = "sql")]
    pub query_type: Option<String>,
    /// Echoed verbatim in the response
    #[schema(example = "req-42")]
    pub request_id: Option<String>,
    /// Execution bound in milliseconds (default 30000)
    #[schema(example = 30000)]
    pub timeout_ms: Option<u64>,
    /// Document backend, flat form
    pub collection: Option<String>,
    /// Document backend, flat form (default `find`)
    pub operation: Option<String>,
    /// Document backend, flat form; pipeline for `aggregate`
    #[schema(value_type = Object)]
    pub filter: Option<Value>,
    /// Document backend: `limit`, `skip`, `sort`, `projection`
    #[schema(value_type = Object)]
    pub options: Option<Value>,
}

// =============================================================================
// Response Types
// =============================================================================

/// Result of `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// `healthy` or `unhealthy`
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(value_type = String, example = "postgresql")]
    pub database_type: Backend,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// RFC 3339
    pub timestamp: String,
}

/// Result of `GET /schema` (alias `GET /introspect`)
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SchemaResponse {
    pub success: bool,
    #[schema(value_type = String, example = "postgresql")]
    pub database_type: Backend,
    pub table_count: usize,
    /// Tables (collections for MongoDB) with their columns
    #[schema(value_type = Vec<Object>)]
    pub tables: SchemaInfo,
    /// The same schema as indented plain text
    pub schema_text: String,
    pub execution_time_ms: u64,
}

impl SchemaResponse {
    pub fn new(backend: Backend, schema: SchemaInfo, elapsed: Duration) -> Self {
        Self {
            success: true,
            database_type: backend,
            table_count: schema.table_count(),
            schema_text: schema.to_text(backend),
            tables: schema,
            execution_time_ms: elapsed.as_millis() as u64,
        }
    }
}

/// Endpoint paths served by this connector
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct EndpointsInfo {
    pub health: String,
    pub execute: String,
    pub schema: String,
    pub info: String,
    pub openapi: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticationInfo {
    #[serde(rename = "type")]
    pub auth_type: String,
    pub header_name: String,
}

/// Result of `GET /info`
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct InfoResponse {
    pub service: String,
    pub version: String,
    #[schema(value_type = String, example = "mongodb")]
    pub database_type: Backend,
    pub endpoints: EndpointsInfo,
    pub authentication: AuthenticationInfo,
    /// Example `/execute` body for this backend
    #[schema(value_type = Object)]
    pub request_format: Value,
}

impl InfoResponse {
    pub fn for_backend(backend: Backend) -> Self {
        Self {
            service: "readgate".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database_type: backend,
            endpoints: EndpointsInfo {
                health: "/health".to_string(),
                execute: "/execute".to_string(),
                schema: "/schema".to_string(),
                info: "/info".to_string(),
                openapi: "/openapi.json".to_string(),
            },
            authentication: AuthenticationInfo {
                auth_type: "api-key".to_string(),
                header_name: "X-API-Key".to_string(),
            },
            request_format: example_request(backend),
        }
    }
}

/// Example `/execute` body for a backend
pub fn example_request(backend: Backend) -> Value {
    match backend {
        Backend::Postgres | Backend::MySql => json!({
            "database_type": backend.as_str(),
            "query": "SELECT * FROM table_name",
            "query_type": "sql",
            "request_id": "unique-id",
            "timeout_ms": 30000,
        }),
        Backend::MongoDb => json!({
            "database_type": backend.as_str(),
            "query": "{\"collection\": \"tenants\", \"operation\": \"find\", \"filter\": {}}",
            "query_type": "find",
            "request_id": "unique-id",
            "timeout_ms": 30000,
        }),
    }
}
