use axum::{
    extract::{ConnectInfo, Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::warn;

use crate::error::GatewayError;
use crate::handlers::GatewayState;

/// Reject requests the access gate does not authorize.
///
/// CORS preflight (`OPTIONS`) passes through untouched. The peer address
/// comes from `ConnectInfo` when the server was started with connect info.
pub async fn gate_middleware(
    State(state): State<Arc<GatewayState>>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() == Method::OPTIONS {
        return next.run(req).await;
    }

    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match state.gate.authorize(req.headers(), peer) {
        Ok(()) => next.run(req).await,
        Err(rejection) => {
            warn!(
                path = %req.uri().path(),
                peer = ?peer,
                code = rejection.error_code(),
                "Request rejected by access gate: {}",
                rejection
            );
            GatewayError::Gate(rejection).into_response()
        }
    }
}
