use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use crate::models::activity::ActivityEvent;
use crate::models::metrics::TimeSeriesPoint;

/// Append-only backend for `ActivityEvent`, `TimeSeriesPoint`, and response-
/// time samples, backed by ClickHouse event tables.
#[derive(Clone)]
pub struct EventStore {
    ch: Client,
}

#[derive(Debug, Clone, Serialize, Deserialize, Row)]
struct ActivityEventRow {
    id: String,
    event_type: String,
    server_id: String,
    server_name: String,
    user_id: String,
    value: f64,
    has_value: u8,
    metadata: String,
    timestamp: String,
}

#[derive(Debug, Clone, Deserialize, Row)]
struct CountRow {
    count: u64,
}

#[derive(Debug, Clone, Deserialize, Row)]
struct SampleRow {
    value: f64,
}

impl EventStore {
    pub fn new(url: &str, database: &str, user: &str, password: &str) -> Self {
        let ch = Client::default()
            .with_url(url)
            .with_database(database)
            .with_user(user)
            .with_password(password);
        Self { ch }
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        self.ch
            .query(
                "CREATE TABLE IF NOT EXISTS activity_events (
                    id String,
                    event_type String,
                    server_id String,
                    server_name String,
                    user_id String,
                    value Float64,
                    has_value UInt8,
                    metadata String,
                    timestamp DateTime64(3)
                ) ENGINE = MergeTree ORDER BY timestamp",
            )
            .execute()
            .await?;

        self.ch
            .query(
                "CREATE TABLE IF NOT EXISTS time_series_data (
                    timestamp DateTime64(3),
                    installs UInt64,
                    api_calls UInt64,
                    active_users UInt64,
                    new_servers UInt64,
                    ratings UInt64
                ) ENGINE = MergeTree ORDER BY timestamp",
            )
            .execute()
            .await?;

        self.ch
            .query(
                "CREATE TABLE IF NOT EXISTS response_times (
                    endpoint String,
                    response_time_ms UInt64,
                    timestamp DateTime64(3)
                ) ENGINE = MergeTree ORDER BY timestamp",
            )
            .execute()
            .await?;

        Ok(())
    }

    pub async fn record_activity(&self, event: &ActivityEvent) -> anyhow::Result<()> {
        let mut insert = self.ch.insert("activity_events")?;
        insert
            .write(&ActivityEventRow {
                id: event.id.clone(),
                event_type: event.event_type.clone(),
                server_id: event.server_id.clone().unwrap_or_default(),
                server_name: event.server_name.clone().unwrap_or_default(),
                user_id: event.user_id.clone().unwrap_or_default(),
                value: event.value.unwrap_or(0.0),
                has_value: event.value.is_some() as u8,
                metadata: event.metadata.to_string(),
                timestamp: event.timestamp.clone(),
            })
            .await?;
        insert.end().await?;
        Ok(())
    }

    pub async fn append_time_series_point(&self, point: &TimeSeriesPoint) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO time_series_data (timestamp, installs, api_calls, active_users, new_servers, ratings) \
             VALUES (parseDateTime64BestEffort('{}'), {}, {}, {}, {}, {})",
            escape(&point.timestamp),
            point.installs,
            point.api_calls,
            point.active_users,
            point.new_servers,
            point.ratings,
        );
        self.ch.query(&sql).execute().await?;
        Ok(())
    }

    pub async fn get_time_series(&self, start: &str, end: &str) -> anyhow::Result<Vec<TimeSeriesPoint>> {
        let sql = format!(
            "SELECT toString(timestamp), installs, api_calls, active_users, new_servers, ratings \
             FROM time_series_data WHERE timestamp >= parseDateTime64BestEffort('{}') \
             AND timestamp <= parseDateTime64BestEffort('{}') ORDER BY timestamp",
            escape(start),
            escape(end),
        );
        #[derive(Deserialize, Row)]
        struct Raw {
            timestamp: String,
            installs: u64,
            api_calls: u64,
            active_users: u64,
            new_servers: u64,
            ratings: u64,
        }
        let rows = self.ch.query(&sql).fetch_all::<Raw>().await?;
        Ok(rows
            .into_iter()
            .map(|r| TimeSeriesPoint {
                timestamp: r.timestamp,
                installs: r.installs as i64,
                api_calls: r.api_calls as i64,
                active_users: r.active_users as i64,
                new_servers: r.new_servers as i64,
                ratings: r.ratings as i64,
            })
            .collect())
    }

    /// Counts events of `event_type` in `[from, to)`, optionally scoped to
    /// one `server_id`. Backs trending velocity/momentum and growth.
    pub async fn count_events(
        &self,
        event_type: &str,
        server_id: Option<&str>,
        from: &str,
        to: &str,
    ) -> anyhow::Result<u64> {
        let scope = server_id
            .map(|id| format!("AND server_id = '{}'", escape(id)))
            .unwrap_or_default();
        let sql = format!(
            "SELECT count() AS count FROM activity_events WHERE event_type = '{}' {scope} \
             AND timestamp >= parseDateTime64BestEffort('{}') AND timestamp < parseDateTime64BestEffort('{}')",
            escape(event_type),
            escape(from),
            escape(to),
        );
        let row = self.ch.query(&sql).fetch_one::<CountRow>().await?;
        Ok(row.count)
    }

    pub async fn distinct_user_count(&self, from: &str, to: &str) -> anyhow::Result<u64> {
        let sql = format!(
            "SELECT uniqExact(user_id) AS count FROM activity_events \
             WHERE user_id != '' AND timestamp >= parseDateTime64BestEffort('{}') \
             AND timestamp < parseDateTime64BestEffort('{}')",
            escape(from),
            escape(to),
        );
        let row = self.ch.query(&sql).fetch_one::<CountRow>().await?;
        Ok(row.count)
    }

    /// Install-type events with `server_id` present, within the window,
    /// grouped by server — feeds the trending algorithm.
    pub async fn install_event_counts_by_server(
        &self,
        from: &str,
        to: &str,
    ) -> anyhow::Result<std::collections::HashMap<String, u64>> {
        #[derive(Deserialize, Row)]
        struct Raw {
            server_id: String,
            count: u64,
        }
        let sql = format!(
            "SELECT server_id, count() AS count FROM activity_events \
             WHERE event_type = 'install' AND server_id != '' \
             AND timestamp >= parseDateTime64BestEffort('{}') AND timestamp < parseDateTime64BestEffort('{}') \
             GROUP BY server_id",
            escape(from),
            escape(to),
        );
        let rows = self.ch.query(&sql).fetch_all::<Raw>().await?;
        Ok(rows.into_iter().map(|r| (r.server_id, r.count)).collect())
    }

    pub async fn recent_activity(&self, limit: u64, event_type: Option<&str>) -> anyhow::Result<Vec<ActivityEvent>> {
        let scope = event_type
            .map(|t| format!("WHERE event_type = '{}'", escape(t)))
            .unwrap_or_default();
        let sql = format!(
            "SELECT id, event_type, server_id, server_name, user_id, value, has_value, metadata, \
             toString(timestamp) AS timestamp FROM activity_events {scope} \
             ORDER BY timestamp DESC LIMIT {limit}"
        );
        let rows = self.ch.query(&sql).fetch_all::<ActivityEventRow>().await?;
        Ok(rows.into_iter().map(row_to_event).collect())
    }

    pub async fn append_response_time(&self, endpoint: &str, response_time_ms: u64, timestamp: &str) -> anyhow::Result<()> {
        let sql = format!(
            "INSERT INTO response_times (endpoint, response_time_ms, timestamp) \
             VALUES ('{}', {}, parseDateTime64BestEffort('{}'))",
            escape(endpoint),
            response_time_ms,
            escape(timestamp),
        );
        self.ch.query(&sql).execute().await?;
        Ok(())
    }

    /// Raw in-window samples, ascending — the caller sorts and indexes at
    /// `floor((n-1)*p/100)` for an exact nearest-rank percentile. `endpoint
    /// = None` aggregates across every probed target.
    pub async fn response_time_samples(&self, endpoint: Option<&str>, since: &str) -> anyhow::Result<Vec<f64>> {
        let scope = endpoint
            .map(|e| format!("AND endpoint = '{}'", escape(e)))
            .unwrap_or_default();
        let sql = format!(
            "SELECT toFloat64(response_time_ms) AS value FROM response_times \
             WHERE timestamp >= parseDateTime64BestEffort('{}') {scope} ORDER BY value",
            escape(since),
        );
        let rows = self.ch.query(&sql).fetch_all::<SampleRow>().await?;
        Ok(rows.into_iter().map(|r| r.value).collect())
    }
}

fn row_to_event(r: ActivityEventRow) -> ActivityEvent {
    ActivityEvent {
        id: r.id,
        event_type: r.event_type,
        server_id: non_empty(r.server_id),
        server_name: non_empty(r.server_name),
        user_id: non_empty(r.user_id),
        value: if r.has_value != 0 { Some(r.value) } else { None },
        metadata: serde_json::from_str(&r.metadata).unwrap_or(serde_json::Value::Null),
        timestamp: r.timestamp,
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Backslashes must be escaped before quotes, or a value ending in `\`
/// neutralizes the following escape and breaks out of the string literal.
fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_handles_trailing_backslash_before_quote() {
        assert_eq!(escape(r"foo\"), r"foo\\");
        assert_eq!(escape(r"foo\'); DROP TABLE x; --"), r"foo\\\'); DROP TABLE x; --");
    }

    #[test]
    fn escape_handles_plain_quote() {
        assert_eq!(escape("o'brien"), r"o\'brien");
    }
}
