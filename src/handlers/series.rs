//! Timeseries query API
//!
//! - `GET /api/v1/series` lists every known timeseries
//! - `GET /api/v1/series/:name?from=&to=` returns stored points, both bounds inclusive

use super::AppState;
use crate::error::StatsError;
use crate::storage::{parse_timestamp, DataPoint, MetricKind};
use axum::extract::{Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Query parameters for the series API
#[derive(Debug, Default, Deserialize)]
pub struct SeriesQueryParams {
    /// Lower bound (defaults to the epoch)
    pub from: Option<String>,

    /// Upper bound (defaults to now)
    pub to: Option<String>,
}

/// Response for a single timeseries
#[derive(Debug, Serialize)]
pub struct SeriesResponse {
    pub timeseries: String,
    pub kind: MetricKind,
    pub sample_interval: String,
    /// First returned timestamp
    pub from: Option<DateTime<Utc>>,
    /// Last returned timestamp
    pub to: Option<DateTime<Utc>>,
    pub data: Vec<DataPoint>,
}

#[derive(Debug, Serialize)]
pub struct SeriesSummary {
    pub name: String,
    pub kind: MetricKind,
}

/// Response for the series listing
#[derive(Debug, Serialize)]
pub struct ListSeriesResponse {
    pub timeseries: Vec<SeriesSummary>,
}

fn parse_bound(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, StatsError> {
    match raw {
        Some(value) if !value.trim().is_empty() => parse_timestamp(value).map(Some),
        _ => Ok(None),
    }
}

/// Human-readable window length, e.g. `15min`
pub fn format_interval(interval: Duration) -> String {
    let secs = interval.as_secs();
    if secs >= 3600 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 && secs % 60 == 0 {
        format!("{}min", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

/// GET /api/v1/series/:name - Stored points of one timeseries
///
/// Example: GET /api/v1/series/getinfo_num_peers?from=2024-05-01T00:00:00Z
pub async fn get_series(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(params): Query<SeriesQueryParams>,
) -> Result<Json<SeriesResponse>, StatsError> {
    let from = parse_bound(params.from.as_deref())?;
    let to = parse_bound(params.to.as_deref())?;

    let series = state.engine.get_series(&name, from, to).await?;

    Ok(Json(SeriesResponse {
        timeseries: series.metric.name,
        kind: series.metric.kind,
        sample_interval: format_interval(state.sample_interval),
        from: series.points.first().map(|p| p.timestamp),
        to: series.points.last().map(|p| p.timestamp),
        data: series.points,
    }))
}

/// GET /api/v1/series - Names and kinds of all known timeseries
pub async fn list_series(
    State(state): State<AppState>,
) -> Result<Json<ListSeriesResponse>, StatsError> {
    let series = state.engine.list_series().await?;

    Ok(Json(ListSeriesResponse {
        timeseries: series
            .into_iter()
            .map(|metric| SeriesSummary {
                name: metric.name,
                kind: metric.kind,
            })
            .collect(),
    }))
}
