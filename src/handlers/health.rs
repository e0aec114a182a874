use super::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

/// Health check endpoint
/// Returns 200 OK if the service is running
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "service": "getstats",
        "version": env!("CARGO_PKG_VERSION"),
    })))
}

/// Readiness check endpoint
/// Returns 200 OK once migrations have run, 503 before that
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    if !state.engine.is_ready() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
            "status": "initializing",
            "service": "getstats",
        })));
    }

    match state.engine.db().stats().await {
        Ok(stats) => (StatusCode::OK, Json(json!({
            "status": "ready",
            "service": "getstats",
            "schema_version": stats.schema_version,
            "series": stats.series_count,
            "data_points": stats.data_point_count,
        }))),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check could not read database stats");
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({
                "status": "degraded",
                "service": "getstats",
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check_returns_ok() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
