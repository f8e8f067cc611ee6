use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use tower::Layer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::{NormalizePath, NormalizePathLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

use super::{analytics, claim, feedback, health, servers, stats};

/// Records every request as a background metric write, matching the
/// usage-tracking middleware's fire-and-forget contract (§5).
async fn track_api_call(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let endpoint = req.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(req).await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    let is_error = response.status().is_client_error() || response.status().is_server_error();
    state.analytics.track_api_call(endpoint, method, duration_ms, is_error);

    response
}

/// Builds the `/vp` namespace per §6, most-specific segment patterns
/// registered ahead of the catch-all `{id}` (§4.8).
///
/// `NormalizePathLayer` has to wrap the whole router rather than go through
/// `Router::layer`, which would only apply it per-matched-route, after the
/// trailing slash already broke the match. See `main.rs` for the matching
/// `into_make_service` call this return type requires.
pub fn build_router(state: AppState) -> NormalizePath<Router> {
    let cors = build_cors(&state);

    let vp = Router::new()
        .route("/servers", get(servers::list_servers))
        .route("/servers/recent", get(servers::recent_servers))
        .route(
            "/servers/{id}/feedback",
            get(feedback::list_feedback),
        )
        .route(
            "/servers/{id}/feedback/{fid}",
            put(feedback::update_feedback).delete(feedback::delete_feedback),
        )
        .route("/servers/{id}/rating/{user_id}", get(feedback::get_user_rating))
        .route("/servers/{id}/install", post(servers::install))
        .route("/servers/{id}/rate", post(servers::rate))
        .route("/servers/{id}/stats", get(servers::get_stats))
        .route("/servers/{id}/claim", post(claim::claim))
        .route("/claim/verify", post(claim::verify))
        .route("/servers/{id}", get(servers::get_server))
        .route("/stats/global", get(stats::global))
        .route("/stats/leaderboard", get(stats::leaderboard))
        .route("/stats/trending", get(stats::trending))
        .route("/analytics", get(analytics::aggregated))
        .route("/analytics/dashboard", get(analytics::dashboard))
        .route("/analytics/activity", get(analytics::activity))
        .route("/analytics/growth", get(analytics::growth))
        .route("/analytics/api-metrics", get(analytics::api_metrics))
        .route("/analytics/search", get(analytics::search))
        .route("/analytics/time-series", get(analytics::time_series))
        .route("/analytics/hot", get(analytics::hot))
        .route("/analytics/milestones", get(analytics::milestones));

    let app = Router::new()
        .nest("/vp", vp)
        .route("/healthz", get(health::healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn_with_state(state.clone(), track_api_call))
        .with_state(state);

    NormalizePathLayer::trim_trailing_slash().layer(app)
}

/// Allow-listed origins only, never `CorsLayer::permissive()`, since
/// credentials must be scoped to matched origins.
fn build_cors(state: &AppState) -> CorsLayer {
    let origins = state.config.cors_origins.clone();
    let allow_origin = if origins.is_empty() {
        AllowOrigin::mirror_request()
    } else {
        let parsed: Vec<_> = origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
            axum::http::Method::DELETE,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(!origins.is_empty())
        .vary([axum::http::header::ORIGIN])
}
