use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Engine error types
#[derive(Debug, Error)]
pub enum StatsError {
    /// Engine has not finished initialization yet
    #[error("Engine not yet initialized")]
    NotReady,

    /// Metric name was never registered
    #[error("Unknown timeseries: {0}")]
    UnknownMetric(String),

    /// Malformed migration definition
    #[error("Invalid migration {sequence}: {reason}")]
    InvalidMigration { sequence: usize, reason: String },

    /// Persisted schema is newer than the running code
    #[error("Database schema version {found} is newer than the {known} migrations known to this build")]
    SchemaTooNew { found: i64, known: usize },

    /// A scheduled collection cycle failed
    #[error("Collection failed: {0}")]
    CollectionFailure(String),

    /// Timestamp bound could not be parsed
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Storage error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Upstream node API error
    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),
}

pub type Result<T, E = StatsError> = std::result::Result<T, E>;

impl StatsError {
    /// Startup-time errors that must abort the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidMigration { .. } | Self::SchemaTooNew { .. })
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            Self::UnknownMetric(_) => StatusCode::NOT_FOUND,
            Self::InvalidTimestamp(_) => StatusCode::BAD_REQUEST,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::InvalidMigration { .. }
            | Self::SchemaTooNew { .. }
            | Self::CollectionFailure(_)
            | Self::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for StatsError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "message": self.to_string(),
                "type": error_type_name(&self),
            }
        }));

        (status, body).into_response()
    }
}

fn error_type_name(error: &StatsError) -> &'static str {
    match error {
        StatsError::NotReady => "not_ready",
        StatsError::UnknownMetric(_) => "unknown_metric",
        StatsError::InvalidMigration { .. } => "invalid_migration",
        StatsError::SchemaTooNew { .. } => "schema_too_new",
        StatsError::CollectionFailure(_) => "collection_failure",
        StatsError::InvalidTimestamp(_) => "invalid_timestamp",
        StatsError::Database(_) => "database_error",
        StatsError::Upstream(_) => "upstream_error",
    }
}
