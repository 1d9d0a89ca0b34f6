//! Error types for the gateway

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use readgate_query::QueryError;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

use crate::envelope::Envelope;

/// Reasons the access gate refuses a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GateRejection {
    #[error("Invalid or missing API key")]
    Unauthorized,

    #[error("Access denied. IP {0} is not whitelisted")]
    IpNotAllowed(IpAddr),

    #[error("Unable to determine client IP")]
    MissingClientIp,

    #[error("Invalid client IP format")]
    InvalidClientIp(String),
}

impl GateRejection {
    pub fn error_code(&self) -> &'static str {
        match self {
            GateRejection::Unauthorized => "UNAUTHORIZED",
            GateRejection::IpNotAllowed(_) => "IP_NOT_ALLOWED",
            GateRejection::MissingClientIp | GateRejection::InvalidClientIp(_) => {
                "INVALID_CLIENT_IP"
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GateRejection::Unauthorized => StatusCode::UNAUTHORIZED,
            GateRejection::IpNotAllowed(_) => StatusCode::FORBIDDEN,
            GateRejection::MissingClientIp | GateRejection::InvalidClientIp(_) => {
                StatusCode::BAD_REQUEST
            }
        }
    }
}

/// Every failure the gateway can report
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Gate(#[from] GateRejection),

    /// The body could not be buffered (too large, aborted stream)
    #[error("{message}")]
    BodyRejected { status: StatusCode, message: String },

    #[error("Endpoint not found")]
    NotFound,

    #[error("Method not allowed")]
    MethodNotAllowed,

    /// A panic caught by the router, outside the query pipeline
    #[error("Internal server error")]
    Panic(String),
}

impl GatewayError {
    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::Query(e) => e.error_code(),
            GatewayError::Gate(e) => e.error_code(),
            GatewayError::BodyRejected { .. } => "INVALID_REQUEST",
            GatewayError::NotFound => "NOT_FOUND",
            GatewayError::MethodNotAllowed => "METHOD_NOT_ALLOWED",
            GatewayError::Panic(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Query(e) => StatusCode::from_u16(e.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            GatewayError::Gate(e) => e.status_code(),
            GatewayError::BodyRejected { status, .. } => *status,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Panic(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Envelope for this error
    pub fn into_envelope(self, request_id: impl Into<String>, elapsed: Duration) -> Envelope {
        Envelope::failure(&self, request_id, elapsed)
    }
}

/// Outside the execute pipeline there is no request id or timing to report.
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        self.into_envelope("", Duration::ZERO).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gate_codes_and_statuses() {
        let cases = [
            (GateRejection::Unauthorized, "UNAUTHORIZED", 401),
            (
                GateRejection::IpNotAllowed("10.0.0.1".parse().unwrap()),
                "IP_NOT_ALLOWED",
                403,
            ),
            (GateRejection::MissingClientIp, "INVALID_CLIENT_IP", 400),
            (
                GateRejection::InvalidClientIp("x".into()),
                "INVALID_CLIENT_IP",
                400,
            ),
        ];
        for (rejection, code, status) in cases {
            assert_eq!(rejection.error_code(), code);
            assert_eq!(rejection.status_code().as_u16(), status);
        }
    }

    #[test]
    fn test_gateway_error_mapping() {
        let e = GatewayError::from(QueryError::MultipleStatements);
        assert_eq!(e.error_code(), "MULTIPLE_STATEMENTS");
        assert_eq!(e.status_code(), StatusCode::BAD_REQUEST);

        let e = GatewayError::from(QueryError::Timeout(100));
        assert_eq!(e.error_code(), "QUERY_EXECUTION_ERROR");
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

        assert_eq!(GatewayError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            GatewayError::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        let e = GatewayError::BodyRejected {
            status: StatusCode::PAYLOAD_TOO_LARGE,
            message: "length limit exceeded".into(),
        };
        assert_eq!(e.error_code(), "INVALID_REQUEST");
        assert_eq!(e.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(e.to_string(), "length limit exceeded");

        let e = GatewayError::Panic("index out of bounds".into());
        assert_eq!(e.error_code(), "INTERNAL_ERROR");
        assert_eq!(e.to_string(), "Internal server error");
    }
}
