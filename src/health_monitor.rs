use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::event_store::EventStore;
use crate::models::health::{HealthProbe, HealthStatus};
use crate::store::MetaStore;
use crate::time::now_string;

/// Background probe loop: a `tokio::spawn` + fixed-interval tick, fetching
/// the probe registry each round so newly registered servers are picked up
/// without a restart.
pub fn spawn_health_monitor(meta: Arc<MetaStore>, events: EventStore, interval_secs: u64, probe_timeout_secs: u64) {
    tokio::spawn(async move {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(probe_timeout_secs))
            .build()
            .unwrap_or_default();
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        loop {
            interval.tick().await;
            if let Err(e) = run_round(&meta, &events, &http).await {
                tracing::error!("health monitor round failed: {e}");
            }
        }
    });
}

async fn run_round(meta: &MetaStore, events: &EventStore, http: &reqwest::Client) -> anyhow::Result<()> {
    let probes = meta.health_probes()?;
    let results = join_all(probes.iter().map(|p| probe_one(http, p))).await;
    let now = now_string();
    for (probe, (status, response_time_ms)) in probes.iter().zip(results) {
        meta.upsert_health(&probe.server_id, status, response_time_ms, status.as_str(), &now)?;
        events
            .append_response_time(&probe.server_id, response_time_ms, &now)
            .await?;
    }
    Ok(())
}

async fn probe_one(http: &reqwest::Client, probe: &HealthProbe) -> (HealthStatus, u64) {
    let start = std::time::Instant::now();
    let result = http
        .get(&probe.url)
        .timeout(Duration::from_secs(probe.timeout_secs.max(1)))
        .send()
        .await;
    let elapsed_ms = start.elapsed().as_millis() as u64;
    let status_code = result.ok().map(|r| r.status().as_u16());
    (HealthStatus::classify(status_code, elapsed_ms), elapsed_ms)
}

/// Exact nearest-rank percentiles over samples since `since`, scoped to one
/// endpoint or aggregated across all probed targets (§4.6).
pub async fn percentiles(events: &EventStore, endpoint: Option<&str>, since: &str) -> crate::models::health::Percentiles {
    let samples = events.response_time_samples(endpoint, since).await.unwrap_or_default();
    crate::analytics::percentiles_from(&samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_maps_status_and_latency() {
        assert_eq!(HealthStatus::classify(Some(200), 50), HealthStatus::Healthy);
        assert_eq!(HealthStatus::classify(Some(200), 1500), HealthStatus::Slow);
        assert_eq!(HealthStatus::classify(Some(404), 50), HealthStatus::Degraded);
        assert_eq!(HealthStatus::classify(Some(503), 50), HealthStatus::Down);
        assert_eq!(HealthStatus::classify(None, 50), HealthStatus::Down);
    }
}
