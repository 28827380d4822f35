use axum::{http::StatusCode, response::IntoResponse, Json};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Upstream answered with a non-2xx status or a body we could not use.
    #[error("Upstream error: {0}")]
    Upstream(String),

    /// GraphQL server answered, but with an `errors` array.
    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("No activity feed schema matched: {0}")]
    ActivitySchemaMismatch(String),

    /// One or more platform runs in a cycle aborted before publishing.
    #[error("Ingestion aborted for: {0}")]
    RunsAborted(String),

    #[error("Data not yet available: {0}")]
    NotAvailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    /// True when the failure happened before any server produced an answer
    /// (connect error, timeout, non-2xx status).
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::Http(_) | AppError::Upstream(_))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match &self {
            AppError::NotAvailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "data not yet available".to_string(),
            ),
            AppError::NotFound(what) => (StatusCode::NOT_FOUND, format!("not found: {what}")),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
