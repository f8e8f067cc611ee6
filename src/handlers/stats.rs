use axum::extract::{Query, State};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::server::LeaderboardQuery;
use crate::models::stats::ExtendedServer;
use crate::validator::{validate_limit, validate_source};
use crate::AppState;

use super::cached;

#[derive(Debug, serde::Deserialize)]
pub struct GlobalQuery {
    pub source: Option<String>,
}

#[derive(Debug, serde::Deserialize)]
pub struct TrendingQuery {
    pub limit: Option<i64>,
    pub source: Option<String>,
}

pub async fn global(
    State(state): State<AppState>,
    Query(q): Query<GlobalQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let source = validate_source(q.source.as_deref())?;
    let key = crate::cache::keys::global(source.storage_str());

    let compute_state = state.clone();
    let (headers, body) = cached(&state, &key, move || async move {
        let stats = compute_state.meta.global(source).map_err(|_| AppError::Internal)?;
        Ok(json!(stats))
    })
    .await?;

    Ok((headers, Json(body)))
}

pub async fn leaderboard(
    State(state): State<AppState>,
    Query(q): Query<LeaderboardQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let source = validate_source(q.source.as_deref())?;
    let limit = validate_limit(q.limit, 10, 100);
    let kind = q.leaderboard_type.as_str();

    let key = crate::cache::keys::leaderboard(kind, limit, source.storage_str());
    let compute_state = state.clone();
    let kind_owned = kind.to_string();
    let (headers, body) = cached(&state, &key, move || async move {
        let data = match kind_owned.as_str() {
            "rating" => json!(compute_state.meta.top_by_rating(limit, source).map_err(|_| AppError::Internal)?),
            "trending" => {
                let trending = compute_state.analytics.calculate_trending(limit, source).await?;
                json!(trending)
            }
            "installs" => json!(compute_state.meta.top_by_installs(limit, source).map_err(|_| AppError::Internal)?),
            other => return Err(AppError::InvalidInput(format!("invalid leaderboard type: {other}"))),
        };
        Ok(json!({ "type": kind_owned, "limit": limit, "data": data }))
    })
    .await?;

    Ok((headers, Json(body)))
}

pub async fn trending(
    State(state): State<AppState>,
    Query(q): Query<TrendingQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let source = validate_source(q.source.as_deref())?;
    let limit = validate_limit(q.limit, 10, 100);
    let servers: Vec<ExtendedServer> = state.analytics.calculate_trending(limit, source).await?;
    Ok(Json(json!({ "limit": limit, "servers": servers })))
}
