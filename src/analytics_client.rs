use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::models::activity::ActivityEvent;
use crate::models::analytics::DashboardMetrics;
use crate::models::stats::ServerStats;

/// Outbound client to the upstream analytics service, used when this
/// instance is deployed as a thin read-through front for a shared backend
/// rather than the system of record (§6). `None` when `VP_ANALYTICS_BASE_URL`
/// is unset.
#[derive(Clone)]
pub struct AnalyticsClient {
    http: reqwest::Client,
    base_url: String,
    user: Option<String>,
    pass: Option<String>,
}

impl AnalyticsClient {
    pub fn new(base_url: String, user: Option<String>, pass: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { http, base_url, user, pass }
    }

    fn request(&self, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let mut req = self.http.get(url);
        if let Some(user) = &self.user {
            req = req.basic_auth(user, self.pass.clone());
        }
        req
    }

    async fn fetch<T: DeserializeOwned>(&self, path: &str) -> anyhow::Result<T> {
        let resp = self.request(path).send().await?;
        if !resp.status().is_success() {
            anyhow::bail!("analytics backend returned {}", resp.status());
        }
        Ok(resp.json::<T>().await?)
    }

    pub async fn get_server_stats(&self, server_id: &str) -> anyhow::Result<ServerStats> {
        self.fetch(&format!("/vp/stats/{}", urlencoding::encode(server_id))).await
    }

    /// Batches the lookup, falling back to per-id requests when the batch
    /// endpoint is unavailable or returns a non-success status.
    pub async fn batch_get_stats(&self, ids: &[String]) -> anyhow::Result<Vec<ServerStats>> {
        let query: String = ids
            .iter()
            .map(|id| format!("ids={}", urlencoding::encode(id)))
            .collect::<Vec<_>>()
            .join("&");
        match self.fetch::<Vec<ServerStats>>(&format!("/vp/stats/batch?{query}")).await {
            Ok(stats) => Ok(stats),
            Err(e) => {
                tracing::warn!("batch stats lookup failed, falling back to per-id: {e}");
                let mut out = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Ok(s) = self.get_server_stats(id).await {
                        out.push(s);
                    }
                }
                Ok(out)
            }
        }
    }

    pub async fn get_dashboard(&self) -> anyhow::Result<DashboardMetrics> {
        self.fetch("/vp/analytics/dashboard").await
    }

    pub async fn get_recent_activity(&self, limit: i64) -> anyhow::Result<Vec<ActivityEvent>> {
        self.fetch(&format!("/vp/analytics/activity?limit={limit}")).await
    }
}
