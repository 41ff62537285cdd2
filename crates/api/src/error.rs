//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use saga::SagaError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No identity headers were forwarded by the gateway.
    Unauthorized(String),
    /// The caller is known but may not do this.
    Forbidden(String),
    /// Saga execution error.
    Saga(SagaError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Saga(err) => saga_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn saga_error_to_response(err: SagaError) -> (StatusCode, String) {
    let status = match &err {
        SagaError::InvalidOrder(_)
        | SagaError::MalformedMessage(_)
        | SagaError::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
        SagaError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        SagaError::NotFound { .. } => StatusCode::NOT_FOUND,
        SagaError::Conflict(_) => StatusCode::CONFLICT,
        SagaError::GatewayTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        SagaError::GatewayError(_) => StatusCode::BAD_GATEWAY,
        _ => {
            tracing::error!(error = %err, "unhandled saga error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, err.to_string())
}

impl From<SagaError> for ApiError {
    fn from(err: SagaError) -> Self {
        ApiError::Saga(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{OrderId, OrderStatus};
    use std::time::Duration;

    fn status_of(err: SagaError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_saga_errors_map_to_status_codes() {
        assert_eq!(
            status_of(SagaError::InvalidTransition {
                from: OrderStatus::Paid,
                to: OrderStatus::Cancelled,
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_of(SagaError::Conflict(OrderId::new())), StatusCode::CONFLICT);
        assert_eq!(
            status_of(SagaError::PermissionDenied("chef".into())),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(SagaError::GatewayTimeout {
                timeout: Duration::from_secs(30)
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_of(SagaError::GatewayError("declined".into())),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_of(SagaError::InvalidOrder("no items".into())),
            StatusCode::BAD_REQUEST
        );
    }
}
