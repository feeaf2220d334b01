use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::session::{SerializerError, SessionError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Serialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// Check if running in production mode (based on RUN_MODE env var)
fn is_production() -> bool {
    std::env::var("RUN_MODE")
        .map(|m| m == "production" || m == "prod")
        .unwrap_or(false)
}

fn redact(log_msg: &str, generic: &str) -> String {
    if is_production() {
        generic.to_string()
    } else {
        log_msg.to_string()
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let log_message = self.to_string();
        let (status, code, client_message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Session(SessionError::TooLarge { .. }) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                "SESSION_TOO_LARGE",
                log_message.clone(),
            ),
            AppError::Session(SessionError::Serializer(SerializerError::NonStringKey(_))) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                log_message.clone(),
            ),
            AppError::Session(SessionError::Store(_)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SESSION_STORE_UNAVAILABLE",
                redact(&log_message, "Service temporarily unavailable"),
            ),
            AppError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "SESSION_ERROR",
                redact(&log_message, "Internal server error"),
            ),
        };

        // Always log the detailed error server-side
        tracing::error!(
            code = %code,
            status = %status.as_u16(),
            message = %log_message,
            "API error"
        );

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message: client_message,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
