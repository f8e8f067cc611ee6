use serde::{Deserialize, Serialize};

use super::stats::AggregatedStats;

#[derive(Debug, Deserialize)]
pub struct ClaimRequest {
    pub repository: String,
    #[serde(default)]
    pub transfer_stats: bool,
}

#[derive(Debug, Serialize)]
pub struct ClaimResponse {
    pub success: bool,
    pub message: String,
    pub server_id: String,
    pub stats: Option<AggregatedStats>,
}

#[derive(Debug, Deserialize)]
pub struct ClaimVerifyRequest {
    pub server_id: String,
    pub github_token: String,
}

#[derive(Debug, Serialize)]
pub struct ClaimVerifyResponse {
    pub verification_code: String,
    pub instructions: String,
    pub expires_at: String,
}

/// State machine steps, §4.9. `Failed` is reachable from any step and is
/// idempotent: re-running a completed claim is a no-op merge, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimState {
    Received,
    TokenVerified,
    RepoVerified,
    ServerUpserted,
    StatsTransferred,
    Done,
    Failed,
}
