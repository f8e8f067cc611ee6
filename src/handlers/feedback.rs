use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::feedback::{FeedbackSort, FeedbackUpdateRequest};
use crate::models::server::{FeedbackDeleteQuery, FeedbackListQuery, SourceQuery};
use crate::time::now_string;
use crate::validator::{sanitize_id, validate_limit, validate_source};
use crate::AppState;

use super::{cached, invalidate_server_writes};

pub async fn list_feedback(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(q): Query<FeedbackListQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let source = validate_source(q.source.as_deref())?;
    let limit = validate_limit(q.limit, 20, 200);
    let offset = q.offset.unwrap_or(0).max(0);
    let sort = FeedbackSort::parse(q.sort.as_deref());
    let sort_key = q.sort.as_deref().unwrap_or("newest");

    let key = crate::cache::keys::feedback(&id, source.storage_str(), limit, offset, sort_key);
    let compute_state = state.clone();
    let compute_id = id.clone();
    let (headers, body) = cached(&state, &key, move || async move {
        let rows = compute_state
            .meta
            .list_feedback(&compute_id, source, limit, offset, sort, true)?;
        let total_count = compute_state.meta.count_feedback(&compute_id, source)?;
        let has_more = offset + (rows.len() as i64) < total_count;
        Ok(json!({ "feedback": rows, "total_count": total_count, "has_more": has_more }))
    })
    .await?;

    Ok((headers, Json(body)))
}

pub async fn get_user_rating(
    State(state): State<AppState>,
    Path((id, user_id)): Path<(String, String)>,
    Query(q): Query<SourceQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let source = validate_source(q.source.as_deref())?;
    let feedback = state.meta.get_user_feedback(&id, &user_id, source)?;
    Ok(Json(json!({
        "has_rated": feedback.is_some(),
        "feedback": feedback,
    })))
}

pub async fn update_feedback(
    State(state): State<AppState>,
    Path((id, fid)): Path<(String, String)>,
    Json(req): Json<FeedbackUpdateRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    if !(1..=5).contains(&req.rating) {
        return Err(AppError::InvalidInput("rating must be in [1,5]".into()));
    }
    if req.comment.len() > 1000 {
        return Err(AppError::InvalidInput("comment exceeds 1000 characters".into()));
    }
    let now = now_string();
    let updated = state
        .meta
        .update_feedback(&fid, &req.user_id, req.rating, &req.comment, &now)?;

    state.cache.invalidate_prefix(&crate::cache::keys::feedback_prefix(&id, updated.source.storage_str())).await;
    invalidate_server_writes(&state, &id).await;

    Ok(Json(json!({ "success": true, "message": "feedback updated", "feedback": updated })))
}

pub async fn delete_feedback(
    State(state): State<AppState>,
    Path((id, fid)): Path<(String, String)>,
    Query(q): Query<FeedbackDeleteQuery>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let source = validate_source(q.source.as_deref())?;

    state.meta.delete_feedback(&fid, &q.user_id)?;
    state.cache.invalidate_prefix(&crate::cache::keys::feedback_prefix(&id, source.storage_str())).await;
    invalidate_server_writes(&state, &id).await;

    Ok(Json(json!({ "success": true, "message": "feedback deleted" })))
}
