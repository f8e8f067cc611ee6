pub mod growth;
pub mod trending;

use std::sync::Arc;

use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::event_store::EventStore;
use crate::models::activity::{ActivityEvent, RecordActivityRequest};
use crate::models::analytics::{DashboardMetrics, DataPoint, GrowthMetrics, PeriodCounts};
use crate::models::health::Percentiles;
use crate::models::metrics::{SearchAnalytics, TimeSeriesPoint};
use crate::models::milestone::{Milestone, INSTALL_MILESTONES};
use crate::models::source::Source;
use crate::models::stats::ExtendedServer;
use crate::store::MetaStore;
use crate::time::{format, now_string, period_duration};

/// Facade named C5 in the overview: counter upserts (`api_call_metrics`,
/// `search_analytics`, `milestones`) delegate to `MetaStore`; append/read
/// operations on append-only data delegate to `EventStore`.
pub struct AnalyticsStore {
    meta: Arc<MetaStore>,
    events: EventStore,
}

impl AnalyticsStore {
    pub fn new(meta: Arc<MetaStore>, events: EventStore) -> Self {
        Self { meta, events }
    }

    pub async fn record_activity(&self, req: RecordActivityRequest) -> AppResult<ActivityEvent> {
        let event = ActivityEvent {
            id: uuid::Uuid::new_v4().to_string(),
            event_type: req.event_type,
            server_id: req.server_id,
            server_name: req.server_name,
            user_id: req.user_id,
            value: req.value,
            metadata: req.metadata,
            timestamp: now_string(),
        };
        self.events.record_activity(&event).await?;
        match event.event_type.as_str() {
            "install" => self.meta.bump_global("total_installs").map_err(|_| AppError::Internal)?,
            "rating" => self.meta.bump_global("total_ratings").map_err(|_| AppError::Internal)?,
            "search" => self.meta.bump_global("total_searches").map_err(|_| AppError::Internal)?,
            _ => {}
        }
        Ok(event)
    }

    /// Fire-and-forget: offloaded to a background task so the response is
    /// never delayed by a metrics write.
    pub fn track_api_call(&self, endpoint: String, method: String, duration_ms: f64, is_error: bool) {
        let meta = self.meta.clone();
        tokio::spawn(async move {
            let now = now_string();
            if let Err(e) = meta.track_api_call(&endpoint, &method, duration_ms, is_error, &now) {
                tracing::warn!("failed to record api call metric: {e}");
            }
        });
    }

    /// Emitting a `search` activity event here (rather than a separate
    /// table) keeps one source of truth for the growth pipeline (§9).
    pub async fn track_search(&self, term: &str, results_count: i64) -> AppResult<()> {
        let now = now_string();
        self.meta
            .track_search(term, results_count, &now)
            .map_err(|_| AppError::Internal)?;
        let _ = self
            .record_activity(RecordActivityRequest {
                event_type: "search".to_string(),
                server_id: None,
                server_name: None,
                user_id: None,
                value: Some(results_count as f64),
                metadata: serde_json::json!({ "term": term }),
            })
            .await;
        Ok(())
    }

    pub fn track_search_conversion(&self, term: &str) -> AppResult<()> {
        self.meta.track_search_conversion(term).map_err(|_| AppError::Internal)?;
        Ok(())
    }

    pub async fn get_dashboard(&self, period: &str) -> AppResult<DashboardMetrics> {
        let now = Utc::now();

        let today = self
            .period_counts(now - period_duration("day"), now)
            .await?;
        let this_week = self
            .period_counts(now - period_duration("week"), now)
            .await?;
        let this_month = self
            .period_counts(now - period_duration("month"), now)
            .await?;

        // `selected` is the window actually named by the caller's `period`;
        // the three buckets above stay fixed regardless of it. Reuse an
        // already-computed bucket when the period matches one, otherwise
        // query the window fresh (covers `year`, which has no fixed bucket).
        let window = period_duration(period);
        let selected = match period {
            "day" => today.clone(),
            "week" => this_week.clone(),
            "month" => this_month.clone(),
            _ => self.period_counts(now - window, now).await?,
        };
        let previous = self.period_counts(now - window * 2, now - window).await?;

        let hours = window.num_hours().max(1) as f64;
        let install_velocity = selected.installs as f64 / hours;
        let weekly_growth = growth::compute(selected.installs as f64, previous.installs as f64, None).growth_rate;

        let samples = self
            .events
            .response_time_samples(None, &format(now - period_duration("day")))
            .await
            .unwrap_or_default();
        let percentiles = percentiles_from(&samples);
        let uptime = self.meta.uptime().map_err(|_| AppError::Internal)?;
        let health = (uptime - (percentiles.p50 - 100.0).max(0.0) / 10.0).max(0.0);

        Ok(DashboardMetrics {
            today,
            this_week,
            this_month,
            period: period.to_string(),
            selected,
            install_velocity,
            weekly_growth,
            health,
            uptime,
            percentiles,
        })
    }

    async fn period_counts(&self, from: chrono::DateTime<Utc>, to: chrono::DateTime<Utc>) -> AppResult<PeriodCounts> {
        let (from, to) = (format(from), format(to));
        let installs = self.events.count_events("install", None, &from, &to).await.unwrap_or(0);
        let ratings = self.events.count_events("rating", None, &from, &to).await.unwrap_or(0);
        let searches = self.events.count_events("search", None, &from, &to).await.unwrap_or(0);
        let new_servers = self
            .events
            .count_events("server_added", None, &from, &to)
            .await
            .unwrap_or(0);
        let api_calls = self.meta.api_calls_in_window(&from, &to).unwrap_or(0);
        Ok(PeriodCounts {
            installs: installs as i64,
            ratings: ratings as i64,
            searches: searches as i64,
            api_calls,
            new_servers: new_servers as i64,
        })
    }

    pub async fn calculate_trending(&self, limit: i64, source: Source) -> AppResult<Vec<ExtendedServer>> {
        let now = Utc::now();
        let mid = now - chrono::Duration::hours(24);
        let from = now - chrono::Duration::hours(48);

        let recent = self
            .events
            .install_event_counts_by_server(&format(mid), &format(now))
            .await
            .unwrap_or_default();
        let previous = self
            .events
            .install_event_counts_by_server(&format(from), &format(mid))
            .await
            .unwrap_or_default();

        let now_str = now_string();
        let mut stats_by_server = std::collections::HashMap::new();
        for id in recent.keys().chain(previous.keys()) {
            if stats_by_server.contains_key(id) {
                continue;
            }
            let stats = self.meta.get_stats(id, source, &now_str).map_err(|_| AppError::Internal)?;
            stats_by_server.insert(id.clone(), stats);
        }

        let top_rated_pool = self
            .meta
            .top_by_rating(limit.max(20), source)
            .map_err(|_| AppError::Internal)?;

        Ok(trending::rank(&recent, &previous, &stats_by_server, &top_rated_pool, limit))
    }

    pub async fn get_growth(&self, metric: &str, period: &str) -> AppResult<GrowthMetrics> {
        let now = Utc::now();
        let window = period_duration(period);
        let current_end = now;
        let current_start = now - window;
        let previous_end = current_start;
        let previous_start = current_start - window;
        let prior_end = previous_start;
        let prior_start = prior_end - window;

        let current_value = self.metric_in_window(metric, current_start, current_end).await?;
        let previous_value = self.metric_in_window(metric, previous_start, previous_end).await?;
        let prior_value = self.metric_in_window(metric, prior_start, prior_end).await?;

        let result = growth::compute(current_value, previous_value, Some(prior_value));

        let data_points = self.bucketed_series(metric, period, current_start, current_end).await;

        Ok(GrowthMetrics {
            metric: metric.to_string(),
            period: period.to_string(),
            current_value,
            previous_value,
            absolute_change: result.absolute_change,
            growth_rate: result.growth_rate,
            momentum: result.momentum,
            trend: result.trend.to_string(),
            data_points,
        })
    }

    async fn metric_in_window(&self, metric: &str, from: chrono::DateTime<Utc>, to: chrono::DateTime<Utc>) -> AppResult<f64> {
        let (from, to) = (format(from), format(to));
        let value = match metric {
            "installs" => self.events.count_events("install", None, &from, &to).await.unwrap_or(0) as f64,
            "ratings" => self.events.count_events("rating", None, &from, &to).await.unwrap_or(0) as f64,
            "servers" => self.events.count_events("server_added", None, &from, &to).await.unwrap_or(0) as f64,
            "users" => self.events.distinct_user_count(&from, &to).await.unwrap_or(0) as f64,
            "api_calls" => self.meta.api_calls_in_window(&from, &to).unwrap_or(0) as f64,
            "searches" => self.meta.searches_updated_in_window(&from, &to).unwrap_or(0) as f64,
            _ => 0.0,
        };
        Ok(value)
    }

    /// Best-effort bucketing over `current`: hour buckets for `day`, day
    /// buckets for `week`/`month`, ~30-day buckets for `year` (§4.5.1).
    async fn bucketed_series(
        &self,
        metric: &str,
        period: &str,
        start: chrono::DateTime<Utc>,
        end: chrono::DateTime<Utc>,
    ) -> Vec<DataPoint> {
        let bucket = match period {
            "week" | "month" => chrono::Duration::days(1),
            "year" => chrono::Duration::days(30),
            _ => chrono::Duration::hours(1),
        };
        let mut points = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let next = (cursor + bucket).min(end);
            let value = self.metric_in_window(metric, cursor, next).await.unwrap_or(0.0);
            points.push(DataPoint {
                timestamp: format(cursor),
                value,
            });
            cursor = next;
        }
        points
    }

    pub async fn get_time_series(&self, start: &str, end: &str) -> AppResult<Vec<TimeSeriesPoint>> {
        self.events.get_time_series(start, end).await.map_err(|_| AppError::Internal)
    }

    pub fn get_top_searches(&self, limit: i64) -> AppResult<Vec<SearchAnalytics>> {
        self.meta.top_searches(limit).map_err(|_| AppError::Internal)
    }

    pub fn get_recent_milestones(&self, limit: i64) -> AppResult<Vec<Milestone>> {
        self.meta.recent_milestones(limit).map_err(|_| AppError::Internal)
    }

    /// At-most-once insert per threshold crossed in `INSTALL_MILESTONES`.
    pub fn check_and_record_milestones(&self) -> AppResult<Vec<Milestone>> {
        let counters = self.meta.global_counters().map_err(|_| AppError::Internal)?;
        let now = now_string();
        let mut recorded = Vec::new();
        for &threshold in INSTALL_MILESTONES {
            if counters.total_installs >= threshold {
                let description = format!("Reached {threshold} total installs");
                let inserted = self
                    .meta
                    .record_milestone_if_new("installs", threshold, &description, &now)
                    .map_err(|_| AppError::Internal)?;
                if inserted {
                    recorded.push(Milestone {
                        id: String::new(),
                        milestone_type: "installs".to_string(),
                        milestone_value: threshold,
                        achieved_at: now.clone(),
                        description,
                    });
                }
            }
        }
        Ok(recorded)
    }

    pub async fn recent_activity(&self, limit: i64, event_type: Option<&str>) -> AppResult<Vec<ActivityEvent>> {
        self.events
            .recent_activity(limit.max(0) as u64, event_type)
            .await
            .map_err(|_| AppError::Internal)
    }
}

/// Exact nearest-rank percentile: sort ascending, index at
/// `floor((n-1)*p/100)`. Returns zeros when empty.
pub fn percentiles_from(samples: &[f64]) -> Percentiles {
    if samples.is_empty() {
        return Percentiles::default();
    }
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let at = |p: f64| {
        let idx = (((sorted.len() - 1) as f64) * p / 100.0).floor() as usize;
        sorted[idx.min(sorted.len() - 1)]
    };
    Percentiles {
        p50: at(50.0),
        p90: at(90.0),
        p99: at(99.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentiles_empty_is_zero() {
        let p = percentiles_from(&[]);
        assert_eq!(p.p50, 0.0);
        assert_eq!(p.p99, 0.0);
    }

    #[test]
    fn percentiles_nearest_rank() {
        let samples: Vec<f64> = (1..=100).map(|n| n as f64).collect();
        let p = percentiles_from(&samples);
        assert_eq!(p.p50, 50.0);
        assert_eq!(p.p90, 90.0);
        assert_eq!(p.p99, 99.0);
    }
}
