use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Slow,
    Degraded,
    Down,
    Unknown,
}

impl HealthStatus {
    /// Placeholder availability score per §4.6, pending a true rolling
    /// computation over probe history.
    pub fn availability(self) -> f64 {
        match self {
            HealthStatus::Healthy => 99.9,
            HealthStatus::Slow => 95.0,
            HealthStatus::Degraded => 75.0,
            HealthStatus::Down => 0.0,
            HealthStatus::Unknown => 50.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Slow => "slow",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Down => "down",
            HealthStatus::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "healthy" => HealthStatus::Healthy,
            "slow" => HealthStatus::Slow,
            "degraded" => HealthStatus::Degraded,
            "down" => HealthStatus::Down,
            _ => HealthStatus::Unknown,
        }
    }

    /// Classify a probe result per §4.6.
    pub fn classify(status_code: Option<u16>, response_time_ms: u64) -> Self {
        match status_code {
            Some(code) if (200..400).contains(&code) && response_time_ms <= 1000 => {
                HealthStatus::Healthy
            }
            Some(code) if response_time_ms > 1000 && code < 500 => HealthStatus::Slow,
            Some(code) if (400..500).contains(&code) => HealthStatus::Degraded,
            Some(code) if code >= 500 => HealthStatus::Down,
            _ => HealthStatus::Down,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSample {
    pub server_id: String,
    pub status: HealthStatus,
    pub response_time_ms: u64,
    pub last_health_check: String,
    pub message: String,
    pub availability: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthProbe {
    pub server_id: String,
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub p50: f64,
    pub p90: f64,
    pub p99: f64,
}
