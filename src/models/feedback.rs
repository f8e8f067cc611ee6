use serde::{Deserialize, Serialize};

use super::source::Source;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerFeedback {
    pub feedback_id: String,
    pub server_id: String,
    pub user_id: String,
    pub source: Source,
    pub rating: i64,
    pub comment: String,
    pub is_public: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    pub user_id: Option<String>,
    pub rating: f64,
    pub comment: Option<String>,
    #[serde(default)]
    pub is_public: Option<bool>,
    #[serde(default)]
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FeedbackUpdateRequest {
    pub user_id: String,
    pub rating: i64,
    pub comment: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSort {
    Newest,
    Oldest,
    RatingHigh,
    RatingLow,
}

impl FeedbackSort {
    pub fn parse(s: Option<&str>) -> Self {
        match s.unwrap_or("newest") {
            "oldest" => FeedbackSort::Oldest,
            "rating_high" => FeedbackSort::RatingHigh,
            "rating_low" => FeedbackSort::RatingLow,
            _ => FeedbackSort::Newest,
        }
    }

    /// SQL `ORDER BY` fragment. `rating_high`/`rating_low` break ties by
    /// `created_at desc`, per §4.4.
    pub fn order_by_sql(self) -> &'static str {
        match self {
            FeedbackSort::Newest => "created_at DESC",
            FeedbackSort::Oldest => "created_at ASC",
            FeedbackSort::RatingHigh => "rating DESC, created_at DESC",
            FeedbackSort::RatingLow => "rating ASC, created_at DESC",
        }
    }
}
