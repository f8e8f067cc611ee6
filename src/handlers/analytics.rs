use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::analytics::AnalyticsResponse;
use crate::validator::validate_limit;
use crate::AppState;

use super::cached;

#[derive(Debug, serde::Deserialize)]
pub struct PeriodQuery {
    pub period: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
    #[serde(rename = "type")]
    pub event_type: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct GrowthQuery {
    pub metric: Option<String>,
    pub period: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TimeSeriesQuery {
    pub start: String,
    pub end: String,
    pub interval: Option<String>,
}

fn valid_period(p: Option<&str>) -> &str {
    match p {
        Some("week") => "week",
        Some("month") => "month",
        Some("year") => "year",
        _ => "day",
    }
}

/// Consults C7 first when configured, logging one warning and falling back
/// to the local store on failure (§6 external-client scenario).
async fn dashboard_via_client_or_store(state: &AppState, period: &str) -> AppResult<serde_json::Value> {
    if let Some(client) = &state.analytics_client {
        match client.get_dashboard().await {
            Ok(metrics) => return Ok(json!(metrics)),
            Err(e) => tracing::warn!("external analytics dashboard fetch failed, falling back to local store: {e}"),
        }
    }
    let metrics = state.analytics.get_dashboard(period).await?;
    Ok(json!(metrics))
}

pub async fn dashboard(
    State(state): State<AppState>,
    Query(q): Query<PeriodQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let period = valid_period(q.period.as_deref());
    let key = crate::cache::keys::dashboard(period);

    let compute_state = state.clone();
    let period_owned = period.to_string();
    let (headers, body) = cached(&state, &key, move || async move {
        dashboard_via_client_or_store(&compute_state, &period_owned).await
    })
    .await?;

    Ok((headers, Json(body)))
}

pub async fn activity(
    State(state): State<AppState>,
    Query(q): Query<ActivityQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let limit = validate_limit(q.limit, 20, 200);
    let events = state.analytics.recent_activity(limit, q.event_type.as_deref()).await?;
    let count = events.len();
    Ok(Json(json!({ "activity": events, "count": count, "type": q.event_type })))
}

pub async fn growth(
    State(state): State<AppState>,
    Query(q): Query<GrowthQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let metric = q.metric.as_deref().unwrap_or("installs");
    let period = valid_period(q.period.as_deref());
    let metrics = state.analytics.get_growth(metric, period).await?;
    Ok(Json(json!(metrics)))
}

pub async fn api_metrics(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let limit = validate_limit(q.limit, 20, 200);
    let endpoints = state.meta.api_call_metrics(limit).map_err(|_| AppError::Internal)?;
    Ok(Json(json!({ "endpoints": endpoints, "count": endpoints.len() })))
}

pub async fn search(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let limit = validate_limit(q.limit, 20, 200);
    let top_searches = state.analytics.get_top_searches(limit)?;
    let counters = state.meta.global_counters().map_err(|_| AppError::Internal)?;
    let total_searches = counters.total_searches;
    let overall_success_rate = if top_searches.is_empty() {
        0.0
    } else {
        top_searches.iter().map(|s| s.success_rate).sum::<f64>() / top_searches.len() as f64
    };
    Ok(Json(json!({
        "top_searches": top_searches,
        "total_searches": total_searches,
        "overall_success_rate": overall_success_rate,
    })))
}

pub async fn time_series(
    State(state): State<AppState>,
    Query(q): Query<TimeSeriesQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let interval = q.interval.as_deref().unwrap_or("hour").to_string();
    let data = state.analytics.get_time_series(&q.start, &q.end).await?;
    let count = data.len();
    Ok(Json(json!({
        "data": data,
        "start": q.start,
        "end": q.end,
        "interval": interval,
        "count": count,
    })))
}

pub async fn hot(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let limit = validate_limit(q.limit, 20, 200);
    let trending = state
        .analytics
        .calculate_trending(limit.max(50), crate::models::source::Source::Registry)
        .await?;
    let hot: Vec<_> = trending
        .into_iter()
        .filter(|s| s.momentum_change.unwrap_or(0.0) > 50.0)
        .take(limit as usize)
        .collect();
    Ok(Json(json!({ "servers": hot, "count": hot.len() })))
}

pub async fn aggregated(State(state): State<AppState>) -> AppResult<impl axum::response::IntoResponse> {
    let dashboard_metrics = state.analytics.get_dashboard("day").await?;
    let trending = state
        .analytics
        .calculate_trending(10, crate::models::source::Source::Registry)
        .await?;
    let recent_activity = state.analytics.recent_activity(20, None).await?;
    let recent_milestones = state.analytics.get_recent_milestones(20)?;
    Ok(Json(json!(AnalyticsResponse {
        dashboard: dashboard_metrics,
        trending,
        recent_activity,
        recent_milestones,
    })))
}

pub async fn milestones(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let limit = validate_limit(q.limit, 20, 200);
    let milestones = state.analytics.get_recent_milestones(limit)?;
    Ok(Json(json!({ "milestones": milestones, "count": milestones.len() })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_period_whitelists_known_values() {
        assert_eq!(valid_period(Some("week")), "week");
        assert_eq!(valid_period(Some("month")), "month");
        assert_eq!(valid_period(Some("year")), "year");
    }

    #[test]
    fn valid_period_defaults_to_day() {
        assert_eq!(valid_period(None), "day");
        assert_eq!(valid_period(Some("fortnight")), "day");
    }
}
