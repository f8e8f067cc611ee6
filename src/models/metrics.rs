use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiCallMetric {
    pub endpoint: String,
    pub method: String,
    pub count: i64,
    pub error_count: i64,
    pub avg_duration_ms: f64,
    pub last_called: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchAnalytics {
    pub search_term: String,
    pub count: i64,
    pub results_found: i64,
    pub installs_from_search: i64,
    pub success_rate: f64,
    pub last_searched: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub timestamp: String,
    pub installs: i64,
    pub api_calls: i64,
    pub active_users: i64,
    pub new_servers: i64,
    pub ratings: i64,
}
