pub mod analytics;
pub mod claim;
pub mod feedback;
pub mod health;
pub mod router;
pub mod servers;
pub mod stats;

use std::future::Future;

use axum::http::HeaderMap;
use serde_json::Value;

use crate::error::AppError;
use crate::AppState;

pub fn cache_header(hit: bool) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let value = if hit { "HIT" } else { "MISS" };
    headers.insert("x-cache", value.parse().expect("static header value"));
    headers
}

/// Read-through helper implementing C8's general contract: check the cache,
/// compute and populate on miss, always returning the `X-Cache` header.
pub async fn cached<F, Fut>(state: &AppState, key: &str, compute: F) -> Result<(HeaderMap, Value), AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Value, AppError>>,
{
    if let Some(value) = state.cache.get(key).await {
        return Ok((cache_header(true), value));
    }
    let value = compute().await?;
    state.cache.set(key.to_string(), value.clone()).await;
    Ok((cache_header(false), value))
}

/// Invalidation set for install/rating writes (§4.8).
pub async fn invalidate_server_writes(state: &AppState, server_id: &str) {
    state.cache.delete(&crate::cache::keys::server(server_id)).await;
    state.cache.delete(&crate::cache::keys::stats_aggregated(server_id)).await;
    state
        .cache
        .delete(&crate::cache::keys::stats(server_id, crate::models::source::Source::Registry.storage_str()))
        .await;
    state
        .cache
        .delete(&crate::cache::keys::stats(server_id, crate::models::source::Source::Community.storage_str()))
        .await;
    state.cache.invalidate_prefix(crate::cache::keys::servers_prefix()).await;
    state.cache.invalidate_prefix(crate::cache::keys::global_prefix()).await;
}
