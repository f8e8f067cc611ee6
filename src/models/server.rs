use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Default)]
pub struct InstallRequest {
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SuccessEnvelope {
    pub success: bool,
    pub message: String,
}

impl SuccessEnvelope {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ServersQuery {
    pub sort: Option<String>,
    pub source: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct SourceQuery {
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub source: Option<String>,
    #[serde(default)]
    pub aggregated: bool,
}

#[derive(Debug, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
    pub source: Option<String>,
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    #[serde(rename = "type")]
    pub leaderboard_type: String,
    pub limit: Option<i64>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LimitSourceQuery {
    pub limit: Option<i64>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackDeleteQuery {
    pub user_id: String,
    pub source: Option<String>,
}
