use serde::{Deserialize, Serialize};

use super::source::Source;

/// Per-(server, source) statistics row. `rating == 0 ⟺ rating_count == 0`
/// is maintained by every write path in `store::stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerStats {
    pub server_id: String,
    pub source: Source,
    pub install_count: i64,
    pub rating: f64,
    pub rating_count: i64,
    pub first_seen: String,
    pub last_updated: String,
    pub active_installs: Option<i64>,
    pub daily_active_users: Option<i64>,
    pub monthly_active_users: Option<i64>,
    pub claimed_from: Option<Source>,
    pub claimed_at: Option<String>,
    pub claimed_to: Option<String>,
}

impl ServerStats {
    /// The all-zero row returned on a cache/store miss, per §4.3 `get`.
    pub fn empty(server_id: &str, source: Source, now: &str) -> Self {
        Self {
            server_id: server_id.to_string(),
            source,
            install_count: 0,
            rating: 0.0,
            rating_count: 0,
            first_seen: now.to_string(),
            last_updated: now.to_string(),
            active_installs: None,
            daily_active_users: None,
            monthly_active_users: None,
            claimed_from: None,
            claimed_at: None,
            claimed_to: None,
        }
    }
}

/// Sums across sources for one server, with a count-weighted mean rating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedStats {
    pub server_id: String,
    pub total_installs: i64,
    pub rating: f64,
    pub rating_count: i64,
    pub by_source: Vec<ServerStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub total_servers: i64,
    pub total_installs: i64,
    pub active_servers: i64,
    pub avg_rating: f64,
    pub last_updated: String,
}

/// Bulk analytics-derived fields, applied via `sync_analytics`.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsSyncUpdate {
    pub server_id: String,
    pub source: Source,
    pub active_installs: Option<i64>,
    pub daily_active_users: Option<i64>,
    pub monthly_active_users: Option<i64>,
}

/// An entry in a leaderboard or trending listing — stats plus enough
/// context to avoid a second round trip to the base registry.
#[derive(Debug, Clone, Serialize)]
pub struct ExtendedServer {
    pub server_id: String,
    pub stats: ServerStats,
    pub trending_score: Option<f64>,
    pub momentum_change: Option<f64>,
    pub trend_period: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentServer {
    pub server_id: String,
    pub stats: ServerStats,
}
