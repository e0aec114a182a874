//! Event intake API
//!
//! `POST /api/v1/events/:name[?value=N]` counts an event in the open sample
//! window. Fire-and-forget: always `202 Accepted`. The event is silently
//! dropped while the engine is still initializing, for names outside the
//! configured event list, for gauge names, and for a `value` that is not
//! positive.

use super::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use serde::Deserialize;

#[derive(Debug, Default, Deserialize)]
pub struct EventParams {
    /// Increment (defaults to 1)
    pub value: Option<i64>,
}

pub async fn record_event(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<EventParams>,
) -> StatusCode {
    match params.value {
        Some(value) => {
            state.engine.record_event(&name, Some(value));
        }
        None => state.hooks.on_event(&name),
    }
    StatusCode::ACCEPTED
}
