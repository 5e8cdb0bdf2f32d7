use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Response messages shared between handlers and tests.
pub mod msg {
    pub const MISSING_SIGNATURE: &str = "missing psp-signature";
    pub const INVALID_SIGNATURE: &str = "invalid signature";
    pub const SECRET_NOT_CONFIGURED: &str = "webhook secret not configured";
    pub const INBOX_TOKEN_REQUIRED: &str = "inbox token required";
}

/// Signature header parse failures. `signature::verify` folds all of these into `false`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    #[error("empty signature header")]
    Empty,

    #[error("missing timestamp")]
    MissingTimestamp,

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("missing v1 signature")]
    MissingSignature,

    #[error("malformed v1 signature")]
    MalformedSignature,
}

/// Inbox backend failures. These never leave `InboxStore`; it degrades instead.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("KV request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("KV error: {0}")]
    Kv(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unexpected KV reply: {0}")]
    UnexpectedReply(String),
}

/// Failures talking to the PSP core.
#[derive(Error, Debug)]
pub enum PspError {
    #[error("PSP core unreachable: {0}")]
    Network(String),

    #[error("PSP core returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("PSP core reported failure: {0}")]
    NotOk(String),

    #[error("malformed invoice payload: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(&'static str),

    #[error("Misconfigured: {0}")]
    Misconfigured(&'static str),

    #[error("Upstream error: {0}")]
    Upstream(#[from] PspError),
}

#[derive(Serialize)]
struct ErrorResponse {
    ok: bool,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not found".to_string(), Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad request".to_string(), Some(msg.clone()))
            }
            AppError::Unauthorized(reason) => (StatusCode::UNAUTHORIZED, reason.to_string(), None),
            AppError::Misconfigured(reason) => {
                tracing::error!("Misconfigured: {}", reason);
                (StatusCode::INTERNAL_SERVER_ERROR, reason.to_string(), None)
            }
            AppError::Upstream(e) => {
                tracing::error!("PSP core error: {}", e);
                (StatusCode::BAD_GATEWAY, "upstream error".to_string(), Some(e.to_string()))
            }
        };

        let body = ErrorResponse {
            ok: false,
            error,
            details,
        };

        (status, Json(body)).into_response()
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<axum::extract::rejection::PathRejection> for AppError {
    fn from(rejection: axum::extract::rejection::PathRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
