use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;
use vp_stats_api::analytics::AnalyticsStore;
use vp_stats_api::analytics_client::AnalyticsClient;
use vp_stats_api::auth::{StubAuthService, StubRegistryClient};
use vp_stats_api::claim::ClaimCoordinator;
use vp_stats_api::config::AppConfig;
use vp_stats_api::event_store::EventStore;
use vp_stats_api::handlers::router::build_router;
use vp_stats_api::store::MetaStore;
use vp_stats_api::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if std::env::args().any(|a| a == "--version") {
        println!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown build time")
        );
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("vp_stats_api=debug,tower_http=debug")))
        .init();

    let config = Arc::new(AppConfig::from_env());

    let meta = Arc::new(MetaStore::open(&config.database_url)?);
    tracing::info!("metadata store opened at {}", config.database_url);

    let events = EventStore::new(
        &config.clickhouse_url,
        &config.clickhouse_database,
        &config.clickhouse_user,
        &config.clickhouse_password,
    );
    events.run_migrations().await?;

    let cache = vp_stats_api::cache::spawn(config.cache_ttl_secs);

    vp_stats_api::health_monitor::spawn_health_monitor(
        meta.clone(),
        events.clone(),
        config.health_check_interval_secs,
        config.health_probe_timeout_secs,
    );

    let analytics_client = config.analytics_base_url.clone().map(|base_url| {
        Arc::new(AnalyticsClient::new(
            base_url,
            config.analytics_user.clone(),
            config.analytics_pass.clone(),
        ))
    });

    // External auth/catalog delegation is out of scope for this crate (§1);
    // a real deployment swaps these stubs for a genuine implementation.
    let claim = Arc::new(ClaimCoordinator::new(
        meta.clone(),
        Arc::new(StubAuthService),
        Arc::new(StubRegistryClient),
        cache.clone(),
    ));

    let analytics = Arc::new(AnalyticsStore::new(meta.clone(), events.clone()));

    let state = AppState {
        meta,
        events,
        analytics,
        cache,
        analytics_client,
        claim,
        config: config.clone(),
    };

    if config.seed_import {
        if let Some(path) = &config.seed_file_path {
            match tokio::time::timeout(Duration::from_secs(30), run_seed_import(&state, path)).await {
                Ok(Ok(())) => tracing::info!("seed import from {path} completed"),
                Ok(Err(e)) => tracing::error!("seed import from {path} failed: {e}"),
                Err(_) => tracing::error!("seed import from {path} timed out after 30s"),
            }
        } else {
            tracing::warn!("VP_SEED_IMPORT set but no VP_SEED_FILE_PATH configured");
        }
    }

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], 8080));
    tracing::info!("vp-stats-api listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        tower::ServiceExt::<axum::extract::Request>::into_make_service(app),
    )
    .await?;

    Ok(())
}

/// Best-effort one-shot bulk load of `ServerStats` rows from a JSON seed
/// file, run once at startup.
async fn run_seed_import(state: &AppState, path: &str) -> anyhow::Result<()> {
    let raw = tokio::fs::read_to_string(path).await?;
    let rows: Vec<vp_stats_api::models::stats::ServerStats> = serde_json::from_str(&raw)?;
    let now = vp_stats_api::time::now_string();
    for row in rows {
        state.meta.seed_stats(&row, &now)?;
    }
    Ok(())
}
