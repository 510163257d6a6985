use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use finscope_core::domain::validation::ValidationError;
use finscope_core::llm::error::{gateway_status, GatewayStatus};
use serde_json::json;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized,
    NotFound(&'static str),
    Unavailable(&'static str),
    Gateway(GatewayStatus),
    Internal(anyhow::Error),
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(v) = err.chain().find_map(|e| e.downcast_ref::<ValidationError>()) {
            return ApiError::BadRequest(v.to_string());
        }
        match gateway_status(&err) {
            Some(status @ (GatewayStatus::RateLimited | GatewayStatus::PaymentRequired)) => {
                ApiError::Gateway(status)
            }
            _ => ApiError::Internal(err),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ApiError::Unavailable(what) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("{what} is not configured"),
            ),
            ApiError::Gateway(status) => {
                let code = match status {
                    GatewayStatus::RateLimited => StatusCode::TOO_MANY_REQUESTS,
                    GatewayStatus::PaymentRequired => StatusCode::PAYMENT_REQUIRED,
                    GatewayStatus::Failed => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (code, status.user_message().to_string())
            }
            ApiError::Internal(err) => {
                sentry_anyhow::capture_anyhow(&err);
                tracing::error!(error = %format!("{err:#}"), "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
