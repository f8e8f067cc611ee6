use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::feedback::RatingRequest;
use crate::models::server::{InstallRequest, RecentQuery, ServersQuery, SourceQuery, StatsQuery};
use crate::models::stats::ExtendedServer;
use crate::time::now_string;
use crate::validator::{sanitize_id, validate_limit, validate_source};
use crate::AppState;

use super::{cached, invalidate_server_writes};

fn extended(stats: crate::models::stats::ServerStats) -> ExtendedServer {
    ExtendedServer {
        server_id: stats.server_id.clone(),
        stats,
        trending_score: None,
        momentum_change: None,
        trend_period: None,
    }
}

pub async fn list_servers(
    State(state): State<AppState>,
    Query(q): Query<ServersQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let source = validate_source(q.source.as_deref())?;
    let limit = validate_limit(q.limit, 50, 1000);
    let sort = q.sort.as_deref().unwrap_or("installs");
    let key = crate::cache::keys::servers(&format!("sort={sort}&source={source}&limit={limit}"));

    let compute_state = state.clone();
    let (headers, body) = cached(&state, &key, move || async move {
        let state = compute_state;
        let rows = match sort {
            "rating" => state.meta.top_by_rating(limit, source).map_err(|_| AppError::Internal)?,
            "trending" => {
                let trending = state
                    .analytics
                    .calculate_trending(limit, source)
                    .await?;
                return Ok(json!({ "servers": trending }));
            }
            _ => state.meta.top_by_installs(limit, source).map_err(|_| AppError::Internal)?,
        };
        let servers: Vec<ExtendedServer> = rows.into_iter().map(extended).collect();
        Ok(json!({ "servers": servers }))
    })
    .await?;

    Ok((headers, Json(body)))
}

pub async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<SourceQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let source = validate_source(q.source.as_deref())?;
    let key = crate::cache::keys::server(&id);

    let compute_state = state.clone();
    let (headers, body) = cached(&state, &key, move || async move {
        let state = compute_state;
        let now = now_string();
        let stats = state.meta.get_stats(&id, source, &now).map_err(|_| AppError::Internal)?;
        Ok(json!({ "server": extended(stats) }))
    })
    .await?;

    Ok((headers, Json(body)))
}

pub async fn install(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<InstallRequest>>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let req = body.map(|Json(r)| r).unwrap_or_default();
    let source = validate_source(req.source.as_deref())?;
    let now = now_string();

    state.meta.increment_install(&id, source, &now).map_err(|_| AppError::Internal)?;
    state
        .analytics
        .record_activity(crate::models::activity::RecordActivityRequest {
            event_type: "install".to_string(),
            server_id: Some(id.clone()),
            server_name: None,
            user_id: None,
            value: None,
            metadata: serde_json::Value::Null,
        })
        .await?;
    if let Err(e) = state.analytics.check_and_record_milestones() {
        tracing::warn!("milestone check failed: {e}");
    }
    invalidate_server_writes(&state, &id).await;

    Ok(Json(json!({ "success": true, "message": "install recorded" })))
}

pub async fn rate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<RatingRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    if !(1.0..=5.0).contains(&req.rating) {
        return Err(AppError::InvalidInput("rating must be in [1,5]".into()));
    }
    let comment = req.comment.unwrap_or_default();
    if comment.len() > 1000 {
        return Err(AppError::InvalidInput("comment exceeds 1000 characters".into()));
    }
    let source = validate_source(req.source.as_deref())?;
    let now = now_string();

    state
        .meta
        .update_rating(&id, source, req.rating, &now)
        .map_err(|_| AppError::Internal)?;
    state
        .analytics
        .record_activity(crate::models::activity::RecordActivityRequest {
            event_type: "rating".to_string(),
            server_id: Some(id.clone()),
            server_name: None,
            user_id: req.user_id.clone(),
            value: Some(req.rating),
            metadata: serde_json::Value::Null,
        })
        .await?;
    invalidate_server_writes(&state, &id).await;

    let Some(user_id) = req.user_id else {
        let stats = state.meta.get_stats(&id, source, &now).map_err(|_| AppError::Internal)?;
        return Ok(Json(json!({ "success": true, "message": "rating recorded", "stats": stats })));
    };

    let is_public = req.is_public.unwrap_or(true);
    let feedback = match state
        .meta
        .create_feedback(&id, &user_id, source, req.rating as i64, &comment, is_public, &now)
    {
        Ok(fb) => fb,
        Err(AppError::DuplicateFeedback) => {
            let existing = state
                .meta
                .get_user_feedback(&id, &user_id, source)
                .map_err(|_| AppError::Internal)?
                .ok_or(AppError::NotFound)?;
            state
                .meta
                .update_feedback(&existing.feedback_id, &user_id, req.rating as i64, &comment, &now)?
        }
        Err(e) => return Err(e),
    };
    state.cache.invalidate_prefix(&crate::cache::keys::feedback_prefix(&id, source.storage_str())).await;

    Ok(Json(json!({ "success": true, "message": "rating recorded", "feedback": feedback })))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<StatsQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let source = validate_source(q.source.as_deref())?;
    let now = now_string();

    if q.aggregated {
        let key = crate::cache::keys::stats_aggregated(&id);
        let compute_state = state.clone();
        let compute_id = id.clone();
        let (headers, body) = cached(&state, &key, move || async move {
            let agg = compute_state
                .meta
                .get_aggregated(&compute_id, &now)
                .map_err(|_| AppError::Internal)?;
            Ok(json!(agg))
        })
        .await?;
        return Ok((headers, Json(body)));
    }

    let key = crate::cache::keys::stats(&id, source.storage_str());
    let compute_state = state.clone();
    let (headers, body) = cached(&state, &key, move || async move {
        let stats = compute_state
            .meta
            .get_stats(&id, source, &now)
            .map_err(|_| AppError::Internal)?;
        Ok(json!(stats))
    })
    .await?;
    Ok((headers, Json(body)))
}

pub async fn recent_servers(
    State(state): State<AppState>,
    Query(q): Query<RecentQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let source = validate_source(q.source.as_deref())?;
    let limit = validate_limit(q.limit, 20, 200);
    let now = now_string();
    let rows = state.meta.get_recent(limit, source, &now, q.days).map_err(|_| AppError::Internal)?;
    let servers: Vec<_> = rows
        .into_iter()
        .map(|stats| json!({ "server_id": stats.server_id.clone(), "stats": stats }))
        .collect();
    let total_count = servers.len();
    Ok(Json(json!({
        "servers": servers,
        "total_count": total_count,
        "filter": { "source": source, "days": q.days },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::source::Source;

    #[test]
    fn extended_carries_server_id_with_no_trend_fields() {
        let stats = crate::models::stats::ServerStats {
            server_id: "demo".to_string(),
            source: Source::Registry,
            install_count: 3,
            rating: 4.0,
            rating_count: 1,
            first_seen: "2026-01-01T00:00:00Z".to_string(),
            last_updated: "2026-01-01T00:00:00Z".to_string(),
            active_installs: None,
            daily_active_users: None,
            monthly_active_users: None,
            claimed_from: None,
            claimed_at: None,
            claimed_to: None,
        };
        let ext = extended(stats);
        assert_eq!(ext.server_id, "demo");
        assert!(ext.trending_score.is_none());
        assert!(ext.momentum_change.is_none());
    }
}
