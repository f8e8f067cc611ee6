use serde::{Deserialize, Serialize};

/// Append-only activity record. `metadata` is an open map — unknown keys
/// must survive a read/write round trip (§9 DESIGN NOTES).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub server_id: Option<String>,
    pub server_name: Option<String>,
    pub user_id: Option<String>,
    pub value: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
pub struct RecordActivityRequest {
    #[serde(rename = "type")]
    pub event_type: String,
    pub server_id: Option<String>,
    pub server_name: Option<String>,
    pub user_id: Option<String>,
    pub value: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}
