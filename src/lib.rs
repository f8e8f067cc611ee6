pub mod analytics;
pub mod analytics_client;
pub mod auth;
pub mod cache;
pub mod claim;
pub mod config;
pub mod error;
pub mod event_store;
pub mod handlers;
pub mod health_monitor;
pub mod models;
pub mod store;
pub mod time;
pub mod validator;

use std::sync::Arc;

use analytics::AnalyticsStore;
use analytics_client::AnalyticsClient;
use cache::Cache;
use claim::ClaimCoordinator;
use config::AppConfig;
use event_store::EventStore;
use store::MetaStore;

/// Shared process state, handed to every handler through axum's `State`
/// extractor. Every field is cheap to `Clone` (`Arc`-wrapped or itself a
/// handle).
#[derive(Clone)]
pub struct AppState {
    pub meta: Arc<MetaStore>,
    pub events: EventStore,
    pub analytics: Arc<AnalyticsStore>,
    pub cache: Cache,
    pub analytics_client: Option<Arc<AnalyticsClient>>,
    pub claim: Arc<ClaimCoordinator>,
    pub config: Arc<AppConfig>,
}
