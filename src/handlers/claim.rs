use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::claim::{ClaimRequest, ClaimVerifyRequest};
use crate::validator::sanitize_id;
use crate::AppState;

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
        .to_string()
}

pub async fn claim(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ClaimRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let id = sanitize_id(&id)?;
    let token = bearer_token(&headers);
    let response = state.claim.execute(&id, &token, req).await?;
    Ok(Json(response))
}

pub async fn verify(
    State(state): State<AppState>,
    Json(req): Json<ClaimVerifyRequest>,
) -> AppResult<impl axum::response::IntoResponse> {
    let server_id = sanitize_id(&req.server_id)?;
    if req.github_token.trim().is_empty() {
        return Err(AppError::InvalidInput("github_token must not be empty".into()));
    }
    let (code, expires_at) = state.claim.generate_verification_code(&server_id)?;
    Ok(Json(json!({
        "verification_code": code,
        "instructions": format!(
            "Add a file containing this code to the root of the claimed repository, then retry the claim within 15 minutes."
        ),
        "expires_at": expires_at,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), "abc123");
    }

    #[test]
    fn bearer_token_missing_header_is_empty() {
        let headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), "");
    }

    #[test]
    fn bearer_token_without_prefix_is_empty() {
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, "abc123".parse().unwrap());
        assert_eq!(bearer_token(&headers), "");
    }
}
