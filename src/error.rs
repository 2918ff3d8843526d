use axum::{http::StatusCode, response::IntoResponse};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Rejected before any side effect (non-positive quantity, malformed id).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rejected with a user-facing reason; no partial mutation.
    #[error("{0}")]
    BusinessRule(#[from] BusinessRuleError),

    #[error("{0} not found: {1}")]
    NotFound(&'static str, String),

    #[error("Unauthorized")]
    Unauthorized,

    /// Feed unreachable or malformed; retried on the next scheduled cycle.
    #[error("Transient feed error: {0}")]
    TransientFeed(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Domain rule violations surfaced to the caller with no partial mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BusinessRuleError {
    #[error("insufficient balance: cost {cost} exceeds wallet {wallet}")]
    InsufficientBalance { wallet: i64, cost: i64 },

    #[error("buy window closed: {0}")]
    WindowClosed(String),

    #[error("price mismatch: quoted {quoted}, current {current}")]
    PriceMismatch { quoted: i64, current: i64 },

    #[error("insufficient shares: requested {requested}, available {available}")]
    InsufficientShares { available: i64, requested: i64 },
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::BusinessRule(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound(_, _) => StatusCode::NOT_FOUND,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::TransientFeed(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
