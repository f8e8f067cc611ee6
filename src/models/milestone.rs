use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub milestone_type: String,
    pub milestone_value: i64,
    pub achieved_at: String,
    pub description: String,
}

/// Thresholds checked by `check_and_record_milestones`, per §4.5.
pub const INSTALL_MILESTONES: &[i64] = &[100, 500, 1000, 5000, 10000, 50000, 100000];
