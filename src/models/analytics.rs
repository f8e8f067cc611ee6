use serde::{Deserialize, Serialize};

use super::activity::ActivityEvent;
use super::health::Percentiles;
use super::stats::ExtendedServer;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PeriodCounts {
    pub installs: i64,
    pub ratings: i64,
    pub searches: i64,
    pub api_calls: i64,
    pub new_servers: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardMetrics {
    pub today: PeriodCounts,
    pub this_week: PeriodCounts,
    pub this_month: PeriodCounts,
    /// The window named by the requested `period` (`day|week|month|year`),
    /// not just one of the three fixed buckets above.
    pub period: String,
    pub selected: PeriodCounts,
    pub install_velocity: f64,
    pub weekly_growth: f64,
    pub health: f64,
    pub uptime: f64,
    pub percentiles: Percentiles,
}

#[derive(Debug, Clone, Serialize)]
pub struct DataPoint {
    pub timestamp: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrowthMetrics {
    pub metric: String,
    pub period: String,
    pub current_value: f64,
    pub previous_value: f64,
    pub absolute_change: f64,
    pub growth_rate: f64,
    pub momentum: Option<f64>,
    pub trend: String,
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsResponse {
    pub dashboard: DashboardMetrics,
    pub trending: Vec<ExtendedServer>,
    pub recent_activity: Vec<ActivityEvent>,
    pub recent_milestones: Vec<super::milestone::Milestone>,
}
