use rusqlite::{params, Row};

use super::MetaStore;
use crate::models::health::{HealthProbe, HealthStatus};
use crate::models::metrics::{ApiCallMetric, SearchAnalytics};
use crate::models::milestone::Milestone;

/// Global installs/ratings/searches/api-call counters backing
/// `AnalyticsStore::get_dashboard`'s today/week/month aggregates.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalCounters {
    pub total_installs: i64,
    pub total_ratings: i64,
    pub total_searches: i64,
    pub total_api_calls: i64,
    pub total_api_errors: i64,
}

impl MetaStore {
    pub fn bump_global(&self, field: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("UPDATE global_counters SET {field} = {field} + 1 WHERE id = 1");
        conn.execute(&sql, [])?;
        Ok(())
    }

    pub fn global_counters(&self) -> anyhow::Result<GlobalCounters> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT total_installs, total_ratings, total_searches, total_api_calls, total_api_errors \
             FROM global_counters WHERE id = 1",
            [],
            |r| {
                Ok(GlobalCounters {
                    total_installs: r.get(0)?,
                    total_ratings: r.get(1)?,
                    total_searches: r.get(2)?,
                    total_api_calls: r.get(3)?,
                    total_api_errors: r.get(4)?,
                })
            },
        )
        .map_err(Into::into)
    }

    /// Upserts `(endpoint, method)`, updating the running duration mean
    /// server-side the same way `update_rating` does.
    pub fn track_api_call(
        &self,
        endpoint: &str,
        method: &str,
        duration_ms: f64,
        is_error: bool,
        now: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO api_call_metrics (endpoint, method, count, error_count, avg_duration_ms, last_called)
             VALUES (?1, ?2, 1, ?3, ?4, ?5)
             ON CONFLICT(endpoint, method) DO UPDATE SET
                count = count + 1,
                error_count = error_count + ?3,
                avg_duration_ms = (avg_duration_ms * count + excluded.avg_duration_ms) / (count + 1),
                last_called = excluded.last_called",
            params![endpoint, method, is_error as i64, duration_ms, now],
        )?;
        conn.execute(
            "UPDATE global_counters SET total_api_calls = total_api_calls + 1, \
             total_api_errors = total_api_errors + ?1 WHERE id = 1",
            params![is_error as i64],
        )?;
        Ok(())
    }

    pub fn api_call_metrics(&self, limit: i64) -> anyhow::Result<Vec<ApiCallMetric>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT endpoint, method, count, error_count, avg_duration_ms, last_called \
             FROM api_call_metrics ORDER BY count DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |r: &Row| {
                Ok(ApiCallMetric {
                    endpoint: r.get(0)?,
                    method: r.get(1)?,
                    count: r.get(2)?,
                    error_count: r.get(3)?,
                    avg_duration_ms: r.get(4)?,
                    last_called: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn track_search(&self, term: &str, results_count: i64, now: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO search_analytics (search_term, count, results_found, last_searched)
             VALUES (?1, 1, ?2, ?3)
             ON CONFLICT(search_term) DO UPDATE SET
                count = count + 1,
                results_found = results_found + excluded.results_found,
                last_searched = excluded.last_searched",
            params![term, results_count, now],
        )?;
        conn.execute(
            "UPDATE global_counters SET total_searches = total_searches + 1 WHERE id = 1",
            [],
        )?;
        Ok(())
    }

    pub fn track_search_conversion(&self, term: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE search_analytics SET installs_from_search = installs_from_search + 1 WHERE search_term = ?1",
            params![term],
        )?;
        conn.execute(
            "UPDATE search_analytics SET success_rate = \
             CASE WHEN count > 0 THEN (installs_from_search * 100.0) / count ELSE 0.0 END \
             WHERE search_term = ?1",
            params![term],
        )?;
        Ok(())
    }

    pub fn top_searches(&self, limit: i64) -> anyhow::Result<Vec<SearchAnalytics>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT search_term, count, results_found, installs_from_search, success_rate, last_searched \
             FROM search_analytics ORDER BY count DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |r: &Row| {
                Ok(SearchAnalytics {
                    search_term: r.get(0)?,
                    count: r.get(1)?,
                    results_found: r.get(2)?,
                    installs_from_search: r.get(3)?,
                    success_rate: r.get(4)?,
                    last_searched: r.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// At-most-once insert per `(type, milestone_value)`.
    pub fn record_milestone_if_new(
        &self,
        milestone_type: &str,
        milestone_value: i64,
        description: &str,
        now: &str,
    ) -> anyhow::Result<bool> {
        let conn = self.conn.lock().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO milestones (id, milestone_type, milestone_value, achieved_at, description) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, milestone_type, milestone_value, now, description],
        )?;
        Ok(inserted > 0)
    }

    pub fn recent_milestones(&self, limit: i64) -> anyhow::Result<Vec<Milestone>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, milestone_type, milestone_value, achieved_at, description \
             FROM milestones ORDER BY achieved_at DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit], |r: &Row| {
                Ok(Milestone {
                    id: r.get(0)?,
                    milestone_type: r.get(1)?,
                    milestone_value: r.get(2)?,
                    achieved_at: r.get(3)?,
                    description: r.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn register_health_probe(&self, probe: &HealthProbe) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_health_probes (server_id, url, timeout_secs) VALUES (?1, ?2, ?3)
             ON CONFLICT(server_id) DO UPDATE SET url = excluded.url, timeout_secs = excluded.timeout_secs",
            params![probe.server_id, probe.url, probe.timeout_secs],
        )?;
        Ok(())
    }

    pub fn health_probes(&self) -> anyhow::Result<Vec<HealthProbe>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT server_id, url, timeout_secs FROM server_health_probes")?;
        let rows = stmt
            .query_map([], |r: &Row| {
                Ok(HealthProbe {
                    server_id: r.get(0)?,
                    url: r.get(1)?,
                    timeout_secs: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn upsert_health(
        &self,
        server_id: &str,
        status: HealthStatus,
        response_time_ms: u64,
        message: &str,
        now: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_health (server_id, status, response_time_ms, last_health_check, message, availability)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(server_id) DO UPDATE SET
                status = excluded.status,
                response_time_ms = excluded.response_time_ms,
                last_health_check = excluded.last_health_check,
                message = excluded.message,
                availability = excluded.availability",
            params![
                server_id,
                status.as_str(),
                response_time_ms as i64,
                now,
                message,
                status.availability(),
            ],
        )?;
        Ok(())
    }

    /// Approximate: sums `count` on API-call metrics whose `last_called`
    /// falls in `[from, to)`, per §4.5.1's metric-specific sources note.
    pub fn api_calls_in_window(&self, from: &str, to: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let sum: Option<i64> = conn.query_row(
            "SELECT SUM(count) FROM api_call_metrics WHERE last_called >= ?1 AND last_called < ?2",
            params![from, to],
            |r| r.get(0),
        )?;
        Ok(sum.unwrap_or(0))
    }

    pub fn searches_updated_in_window(&self, from: &str, to: &str) -> anyhow::Result<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM search_analytics WHERE last_searched >= ?1 AND last_searched < ?2",
            params![from, to],
            |r| r.get(0),
        )?;
        Ok(count)
    }

    /// Average of per-server `availability`; default 99.9 with no data.
    pub fn uptime(&self) -> anyhow::Result<f64> {
        let conn = self.conn.lock().unwrap();
        let avg: Option<f64> =
            conn.query_row("SELECT AVG(availability) FROM server_health", [], |r| r.get(0))?;
        Ok(avg.unwrap_or(99.9))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-01-01T00:00:00Z";

    #[test]
    fn track_api_call_computes_running_mean() {
        let store = MetaStore::open_in_memory().unwrap();
        store.track_api_call("/vp/servers", "GET", 100.0, false, NOW).unwrap();
        store.track_api_call("/vp/servers", "GET", 200.0, false, NOW).unwrap();
        let rows = store.api_call_metrics(10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 2);
        assert!((rows[0].avg_duration_ms - 150.0).abs() < 1e-6);
    }

    #[test]
    fn milestone_recorded_at_most_once() {
        let store = MetaStore::open_in_memory().unwrap();
        assert!(store.record_milestone_if_new("installs", 100, "100 installs", NOW).unwrap());
        assert!(!store.record_milestone_if_new("installs", 100, "100 installs", NOW).unwrap());
        assert_eq!(store.recent_milestones(10).unwrap().len(), 1);
    }

    #[test]
    fn search_conversion_recomputes_success_rate() {
        let store = MetaStore::open_in_memory().unwrap();
        store.track_search("postgres", 5, NOW).unwrap();
        store.track_search("postgres", 3, NOW).unwrap();
        store.track_search_conversion("postgres").unwrap();
        let rows = store.top_searches(10).unwrap();
        assert_eq!(rows[0].count, 2);
        assert!((rows[0].success_rate - 50.0).abs() < 1e-6);
    }

    #[test]
    fn uptime_defaults_with_no_data() {
        let store = MetaStore::open_in_memory().unwrap();
        assert_eq!(store.uptime().unwrap(), 99.9);
    }
}
