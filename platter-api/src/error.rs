use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use platter_core::CoreError;
use platter_order::OrderError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    AuthenticationError(String),
    AuthorizationError(String),
    ValidationError(String),
    NotFoundError(String),
    ConflictError(String),
    UpstreamError(String),
    UnavailableError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UpstreamError(msg) => {
                tracing::warn!("Upstream failure: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment provider unavailable, please retry".to_string())
            }
            AppError::UnavailableError(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let msg = err.to_string();
        match err {
            OrderError::Validation(_)
            | OrderError::EmptyCart
            | OrderError::AlreadyPaid(_)
            | OrderError::PaymentFailed(_)
            | OrderError::InsufficientBalance { .. }
            | OrderError::BelowMinimum { .. } => AppError::ValidationError(msg),
            OrderError::NotFound(_)
            | OrderError::ProductNotFound(_)
            | OrderError::PaymentRecordNotFound(_) => AppError::NotFoundError(msg),
            OrderError::NotAuthorized(_) => AppError::AuthorizationError(msg),
            OrderError::InvalidTransition { .. } | OrderError::Conflict(_) => {
                AppError::ConflictError(msg)
            }
            OrderError::WalletBusy | OrderError::RefundInProgress(_) => {
                AppError::UnavailableError(msg)
            }
            OrderError::UpstreamGateway(_) => AppError::UpstreamError(msg),
            OrderError::Storage(_) => AppError::InternalServerError(msg),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::IdentityError(msg) => AppError::AuthenticationError(msg),
            other => OrderError::from(other).into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
