//! HTTP handlers for the query gateway

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Bytes,
    extract::{rejection::BytesRejection, State},
    http::{header, Method, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    routing::post,
    Json, Router,
};
use futures::FutureExt;
use readgate_query::{normalize, QueryError, ResultSet, DEFAULT_TIMEOUT_MS};
use serde_json::Value;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tracing::{debug, error, info, warn};
use utoipa::OpenApi;

use super::types::*;
use crate::envelope::{Envelope, ResponseEnvelope};
use crate::error::GatewayError;
use crate::gate::{gate_middleware, API_KEY_HEADER};

/// OpenAPI documentation for gateway endpoints
#[derive(OpenApi)]
#[openapi(
    paths(health, execute, schema, info),
    components(
        schemas(
            ExecuteRequest,
            ResponseEnvelope,
            HealthResponse,
            SchemaResponse,
            InfoResponse,
            EndpointsInfo,
            AuthenticationInfo,
        )
    ),
    tags(
        (name = "Gateway", description = "Read-only query execution")
    )
)]
pub struct ApiDoc;

/// Text of the execution error reported when a backend call panics
const UNEXPECTED_BACKEND_FAILURE: &str = "Unexpected failure in the database driver";

/// Build the gateway router.
///
/// `/health`, `/execute`, `/schema` (alias `/introspect`) and `/info` sit
/// behind the access gate; `/openapi.json` and CORS preflight do not. A
/// known path hit with an unsupported method gets a 405 envelope.
pub fn configure_routes(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static(API_KEY_HEADER),
        ]);

    let gated = Router::new()
        .route(
            "/health",
            get(health).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/execute",
            post(execute).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/schema",
            get(schema).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/introspect",
            get(schema).options(preflight).fallback(method_not_allowed),
        )
        .route(
            "/info",
            get(info).options(preflight).fallback(method_not_allowed),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            gate_middleware,
        ));

    Router::new()
        .merge(gated)
        .route("/openapi.json", get(openapi).fallback(method_not_allowed))
        .fallback(fallback)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .with_state(state)
}

/// Check backend connectivity
#[utoipa::path(
    tag = "Gateway",
    get,
    path = "/health",
    responses(
        (status = 200, description = "Backend reachable", body = HealthResponse),
        (status = 401, description = "Unauthorized", body = ResponseEnvelope),
        (status = 403, description = "Client network not allowed", body = ResponseEnvelope),
        (status = 503, description = "Backend unreachable", body = HealthResponse)
    ),
    security(("api_key" = []))
)]
pub async fn health(State(state): State<Arc<GatewayState>>) -> Response {
    let backend = state.backend();
    let timestamp = chrono::Utc::now().to_rfc3339();

    match state.adapter.ping().await {
        Ok(()) => {
            debug!("Health check passed for {}", backend);
            Json(HealthResponse {
                status: "healthy".to_string(),
                database_type: backend,
                error: None,
                timestamp,
            })
            .into_response()
        }
        Err(e) => {
            warn!("Health check failed for {}: {}", backend, e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HealthResponse {
                    status: "unhealthy".to_string(),
                    database_type: backend,
                    error: Some(e.to_string()),
                    timestamp,
                }),
            )
                .into_response()
        }
    }
}

/// Run a read-only query
#[utoipa::path(
    tag = "Gateway",
    post,
    path = "/execute",
    request_body = ExecuteRequest,
    responses(
        (status = 200, description = "Query executed", body = ResponseEnvelope),
        (status = 400, description = "Request rejected", body = ResponseEnvelope),
        (status = 401, description = "Unauthorized", body = ResponseEnvelope),
        (status = 403, description = "Client network not allowed", body = ResponseEnvelope),
        (status = 413, description = "Body too large", body = ResponseEnvelope),
        (status = 500, description = "Execution failed", body = ResponseEnvelope)
    ),
    security(("api_key" = []))
)]
pub async fn execute(
    State(state): State<Arc<GatewayState>>,
    body: Result<Bytes, BytesRejection>,
) -> Envelope {
    let started = Instant::now();

    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            warn!("Rejected request body: {}", rejection.body_text());
            let error = GatewayError::BodyRejected {
                status: rejection.status(),
                message: rejection.body_text(),
            };
            return error.into_envelope("", started.elapsed());
        }
    };

    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            let error = GatewayError::Query(QueryError::InvalidRequest(e.to_string()));
            warn!("Rejected unreadable request body: {}", e);
            return error.into_envelope("", started.elapsed());
        }
    };
    let request_id = normalize::request_id_of(&body);

    let outcome = contain_panic(run_pipeline(&state, &body)).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(rows) => {
            info!(
                request_id = %request_id,
                rows = rows.count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Query executed"
            );
            Envelope::success(rows, request_id, elapsed)
        }
        Err(e) => {
            match &e {
                GatewayError::Query(q) if q.is_validation() => {
                    warn!(request_id = %request_id, code = e.error_code(), "Query rejected: {}", e)
                }
                _ => error!(request_id = %request_id, code = e.error_code(), "Query failed: {}", e),
            }
            e.into_envelope(request_id, elapsed)
        }
    }
}

/// Normalize, validate and execute one request body
async fn run_pipeline(state: &GatewayState, body: &Value) -> Result<ResultSet, GatewayError> {
    let request = normalize::normalize(state.backend(), body)?;
    let validated = state.adapter.validate(request)?;

    debug!(
        request_id = %validated.request_id(),
        timeout_ms = validated.timeout_ms(),
        "Dispatching validated query"
    );

    Ok(state
        .adapter
        .execute(&validated, validated.timeout())
        .await?)
}

/// Run a backend call, reporting a panic as an execution failure
async fn contain_panic<T>(
    call: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    AssertUnwindSafe(call)
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| {
            error!("Backend call panicked: {}", panic_message(payload));
            Err(QueryError::execution(UNEXPECTED_BACKEND_FAILURE).into())
        })
}

/// Describe the tables (or collections) the connector can read
#[utoipa::path(
    tag = "Gateway",
    get,
    path = "/schema",
    responses(
        (status = 200, description = "Readable tables and columns", body = SchemaResponse),
        (status = 401, description = "Unauthorized", body = ResponseEnvelope),
        (status = 403, description = "Client network not allowed", body = ResponseEnvelope),
        (status = 500, description = "Introspection failed", body = ResponseEnvelope)
    ),
    security(("api_key" = []))
)]
pub async fn schema(State(state): State<Arc<GatewayState>>) -> Response {
    let started = Instant::now();
    let timeout = Duration::from_millis(DEFAULT_TIMEOUT_MS);

    let outcome = contain_panic(async { state.adapter.introspect(timeout).await.map_err(GatewayError::from) })
        .await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(schema) => {
            info!(
                tables = schema.table_count(),
                elapsed_ms = elapsed.as_millis() as u64,
                "Schema introspected"
            );
            Json(SchemaResponse::new(state.backend(), schema, elapsed)).into_response()
        }
        Err(e) => {
            error!(code = e.error_code(), "Schema introspection failed: {}", e);
            e.into_envelope("", elapsed).into_response()
        }
    }
}

/// Describe this connector
#[utoipa::path(
    tag = "Gateway",
    get,
    path = "/info",
    responses(
        (status = 200, description = "Connector metadata", body = InfoResponse),
        (status = 401, description = "Unauthorized", body = ResponseEnvelope)
    ),
    security(("api_key" = []))
)]
pub async fn info(State(state): State<Arc<GatewayState>>) -> Json<InfoResponse> {
    Json(InfoResponse::for_backend(state.backend()))
}

pub async fn openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// CORS preflight answer for any path
pub async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, X-API-Key"),
        ],
    )
}

async fn fallback(method: Method) -> Response {
    if method == Method::OPTIONS {
        return preflight().await.into_response();
    }
    GatewayError::NotFound.into_response()
}

async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let message = panic_message(payload);
    error!("Handler panicked: {}", message);
    GatewayError::Panic(message).into_response()
}
