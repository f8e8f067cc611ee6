use chrono::{Duration, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::MetaStore;
use crate::models::source::Source;
use crate::models::stats::{AggregatedStats, AnalyticsSyncUpdate, GlobalStats, ServerStats};
use crate::validator::SafeFilter;

fn row_to_stats(row: &Row) -> rusqlite::Result<ServerStats> {
    let source: String = row.get("source")?;
    let claimed_from: Option<String> = row.get("claimed_from")?;
    Ok(ServerStats {
        server_id: row.get("server_id")?,
        source: Source::from_storage_str(&source).unwrap_or(Source::Registry),
        install_count: row.get("install_count")?,
        rating: row.get("rating")?,
        rating_count: row.get("rating_count")?,
        first_seen: row.get("first_seen")?,
        last_updated: row.get("last_updated")?,
        active_installs: row.get("active_installs")?,
        daily_active_users: row.get("daily_active_users")?,
        monthly_active_users: row.get("monthly_active_users")?,
        claimed_from: claimed_from.and_then(|s| Source::from_storage_str(&s)),
        claimed_at: row.get("claimed_at")?,
        claimed_to: row.get("claimed_to")?,
    })
}

const SELECT_COLS: &str = "server_id, source, install_count, rating, rating_count, first_seen, \
     last_updated, active_installs, daily_active_users, monthly_active_users, claimed_from, \
     claimed_at, claimed_to";

impl MetaStore {
    /// Empty default on miss, per §4.3.
    pub fn get_stats(&self, server_id: &str, source: Source, now: &str) -> anyhow::Result<ServerStats> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .prepare(&format!(
                "SELECT {SELECT_COLS} FROM server_stats WHERE server_id = ?1 AND source = ?2"
            ))?
            .query_row(params![server_id, source.storage_str()], row_to_stats)
            .optional()?;
        Ok(row.unwrap_or_else(|| ServerStats::empty(server_id, source, now)))
    }

    pub fn get_by_server(&self, server_id: &str) -> anyhow::Result<Vec<ServerStats>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {SELECT_COLS} FROM server_stats WHERE server_id = ?1"))?;
        let rows = stmt
            .query_map(params![server_id], row_to_stats)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Missing entries are filled with zero defaults. `Source::All` sums
    /// across sources per id into a synthetic row.
    pub fn batch_get(
        &self,
        ids: &[String],
        source: Source,
        now: &str,
    ) -> anyhow::Result<std::collections::HashMap<String, ServerStats>> {
        let mut out = std::collections::HashMap::new();
        for id in ids {
            let stats = if source == Source::All {
                let agg = self.get_aggregated(id, now)?;
                ServerStats {
                    server_id: agg.server_id.clone(),
                    source: Source::All,
                    install_count: agg.total_installs,
                    rating: agg.rating,
                    rating_count: agg.rating_count,
                    first_seen: now.to_string(),
                    last_updated: now.to_string(),
                    active_installs: None,
                    daily_active_users: None,
                    monthly_active_users: None,
                    claimed_from: None,
                    claimed_at: None,
                    claimed_to: None,
                }
            } else {
                self.get_stats(id, source, now)?
            };
            out.insert(id.clone(), stats);
        }
        Ok(out)
    }

    /// Sums installs/counts across sources; rating is the count-weighted
    /// mean across per-source means.
    pub fn get_aggregated(&self, server_id: &str, now: &str) -> anyhow::Result<AggregatedStats> {
        let by_source = self.get_by_server(server_id)?;
        let total_installs: i64 = by_source.iter().map(|s| s.install_count).sum();
        let rating_count: i64 = by_source.iter().map(|s| s.rating_count).sum();
        let rating = if rating_count > 0 {
            by_source
                .iter()
                .map(|s| s.rating * s.rating_count as f64)
                .sum::<f64>()
                / rating_count as f64
        } else {
            0.0
        };
        let by_source = if by_source.is_empty() {
            vec![ServerStats::empty(server_id, Source::Registry, now)]
        } else {
            by_source
        };
        Ok(AggregatedStats {
            server_id: server_id.to_string(),
            total_installs,
            rating,
            rating_count,
            by_source,
        })
    }

    pub fn increment_install(&self, server_id: &str, source: Source, now: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_stats (server_id, source, install_count, first_seen, last_updated)
             VALUES (?1, ?2, 1, ?3, ?3)
             ON CONFLICT(server_id, source) DO UPDATE SET
                install_count = install_count + 1,
                last_updated = excluded.last_updated",
            params![server_id, source.storage_str(), now],
        )?;
        Ok(())
    }

    /// Atomic running-mean update: a single `INSERT ... ON CONFLICT DO
    /// UPDATE` recomputes both `rating` and `rating_count` server-side, so
    /// the mutex-held statement is the whole critical section — no sample
    /// is lost under concurrency.
    pub fn update_rating(
        &self,
        server_id: &str,
        source: Source,
        new_rating: f64,
        now: &str,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_stats (server_id, source, rating, rating_count, first_seen, last_updated)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(server_id, source) DO UPDATE SET
                rating = (rating * rating_count + excluded.rating) / (rating_count + 1),
                rating_count = rating_count + 1,
                last_updated = excluded.last_updated",
            params![server_id, source.storage_str(), new_rating, now],
        )?;
        Ok(())
    }

    fn top_by(&self, order_by: &str, source: Source, limit: i64, extra_where: &str) -> anyhow::Result<Vec<ServerStats>> {
        let conn = self.conn.lock().unwrap();
        let sql = match crate::validator::safe_filter(source) {
            SafeFilter::Any => format!(
                "SELECT {SELECT_COLS} FROM server_stats WHERE 1=1 {extra_where} ORDER BY {order_by} LIMIT ?1"
            ),
            SafeFilter::Exact(_) => format!(
                "SELECT {SELECT_COLS} FROM server_stats WHERE source = ?2 {extra_where} ORDER BY {order_by} LIMIT ?1"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = match crate::validator::safe_filter(source) {
            SafeFilter::Any => stmt
                .query_map(params![limit], row_to_stats)?
                .collect::<Result<Vec<_>, _>>()?,
            SafeFilter::Exact(s) => stmt
                .query_map(params![limit, s.storage_str()], row_to_stats)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    pub fn top_by_installs(&self, limit: i64, source: Source) -> anyhow::Result<Vec<ServerStats>> {
        self.top_by("install_count DESC", source, limit, "")
    }

    pub fn top_by_rating(&self, limit: i64, source: Source) -> anyhow::Result<Vec<ServerStats>> {
        self.top_by(
            "rating DESC, install_count DESC",
            source,
            limit,
            "AND rating_count >= 5",
        )
    }

    /// `days` bounds results to servers first seen within that many days of
    /// `now`; `None` leaves the window unbounded.
    pub fn get_recent(&self, limit: i64, source: Source, now: &str, days: Option<i64>) -> anyhow::Result<Vec<ServerStats>> {
        let conn = self.conn.lock().unwrap();
        let cutoff = match days {
            Some(d) => {
                let now_dt = chrono::DateTime::parse_from_rfc3339(now)
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|_| Utc::now());
                (now_dt - Duration::days(d.max(0))).format("%Y-%m-%dT%H:%M:%SZ").to_string()
            }
            None => "0000-01-01T00:00:00Z".to_string(),
        };

        let sql = match crate::validator::safe_filter(source) {
            SafeFilter::Any => format!(
                "SELECT {SELECT_COLS} FROM server_stats WHERE first_seen >= ?2 ORDER BY first_seen DESC LIMIT ?1"
            ),
            SafeFilter::Exact(_) => format!(
                "SELECT {SELECT_COLS} FROM server_stats WHERE source = ?3 AND first_seen >= ?2 \
                     ORDER BY first_seen DESC LIMIT ?1"
            ),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = match crate::validator::safe_filter(source) {
            SafeFilter::Any => stmt
                .query_map(params![limit, cutoff], row_to_stats)?
                .collect::<Result<Vec<_>, _>>()?,
            SafeFilter::Exact(s) => stmt
                .query_map(params![limit, cutoff, s.storage_str()], row_to_stats)?
                .collect::<Result<Vec<_>, _>>()?,
        };
        Ok(rows)
    }

    pub fn global(&self, source: Source) -> anyhow::Result<GlobalStats> {
        let conn = self.conn.lock().unwrap();
        let sql = match crate::validator::safe_filter(source) {
            SafeFilter::Any => {
                "SELECT COUNT(*), COALESCE(SUM(install_count),0), \
                 COALESCE(SUM(CASE WHEN active_installs > 0 THEN 1 ELSE 0 END),0), \
                 COALESCE(SUM(rating * rating_count),0), COALESCE(SUM(rating_count),0), \
                 COALESCE(MAX(last_updated),'') FROM server_stats"
            }
            SafeFilter::Exact(_) => {
                "SELECT COUNT(*), COALESCE(SUM(install_count),0), \
                 COALESCE(SUM(CASE WHEN active_installs > 0 THEN 1 ELSE 0 END),0), \
                 COALESCE(SUM(rating * rating_count),0), COALESCE(SUM(rating_count),0), \
                 COALESCE(MAX(last_updated),'') FROM server_stats WHERE source = ?1"
            }
        };
        let row = |r: &Row| -> rusqlite::Result<(i64, i64, i64, f64, i64, String)> {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?))
        };
        let (total_servers, total_installs, active_servers, weighted_sum, rating_count, last_updated) =
            match crate::validator::safe_filter(source) {
                SafeFilter::Any => conn.query_row(sql, [], row)?,
                SafeFilter::Exact(s) => conn.query_row(sql, params![s.storage_str()], row)?,
            };
        let avg_rating = if rating_count > 0 {
            weighted_sum / rating_count as f64
        } else {
            0.0
        };
        Ok(GlobalStats {
            total_servers,
            total_installs,
            active_servers,
            avg_rating,
            last_updated,
        })
    }

    pub fn sync_analytics(&self, updates: &[AnalyticsSyncUpdate], now: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        for u in updates {
            conn.execute(
                "INSERT INTO server_stats (server_id, source, active_installs, daily_active_users, \
                     monthly_active_users, first_seen, last_updated)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(server_id, source) DO UPDATE SET
                    active_installs = excluded.active_installs,
                    daily_active_users = excluded.daily_active_users,
                    monthly_active_users = excluded.monthly_active_users,
                    last_updated = excluded.last_updated",
                params![
                    u.server_id,
                    u.source.storage_str(),
                    u.active_installs,
                    u.daily_active_users,
                    u.monthly_active_users,
                    now,
                ],
            )?;
        }
        Ok(())
    }

    /// Read-merge-write transfer, idempotent on re-run (§4.9). Returns the
    /// merged target stats.
    pub fn transfer(
        &self,
        server_id: &str,
        from_source: Source,
        to_source: Source,
        now: &str,
    ) -> anyhow::Result<ServerStats> {
        let from = self.get_stats(server_id, from_source, now)?;
        let to = self.get_stats(server_id, to_source, now)?;

        let install_count = from.install_count + to.install_count;
        let rating_count = from.rating_count + to.rating_count;
        let rating = if rating_count > 0 {
            (from.rating * from.rating_count as f64 + to.rating * to.rating_count as f64)
                / rating_count as f64
        } else {
            0.0
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_stats (server_id, source, install_count, rating, rating_count, \
                 active_installs, daily_active_users, monthly_active_users, claimed_from, claimed_at, \
                 first_seen, last_updated)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
             ON CONFLICT(server_id, source) DO UPDATE SET
                install_count = excluded.install_count,
                rating = excluded.rating,
                rating_count = excluded.rating_count,
                active_installs = COALESCE(server_stats.active_installs, excluded.active_installs),
                daily_active_users = COALESCE(server_stats.daily_active_users, excluded.daily_active_users),
                monthly_active_users = COALESCE(server_stats.monthly_active_users, excluded.monthly_active_users),
                claimed_from = excluded.claimed_from,
                claimed_at = excluded.claimed_at,
                last_updated = excluded.last_updated",
            params![
                server_id,
                to_source.storage_str(),
                install_count,
                rating,
                rating_count,
                to.active_installs,
                to.daily_active_users,
                to.monthly_active_users,
                from_source.storage_str(),
                now,
                now,
            ],
        )?;

        // Zero the source row's counters in the same statement that stamps
        // the audit fields, so a re-run reads back a blank `from` and the
        // merge above is a no-op addition instead of double-counting.
        conn.execute(
            "INSERT INTO server_stats (server_id, source, install_count, rating, rating_count, \
                 claimed_at, claimed_to, first_seen, last_updated)
             VALUES (?1, ?2, 0, 0.0, 0, ?3, ?4, ?3, ?3)
             ON CONFLICT(server_id, source) DO UPDATE SET
                install_count = 0,
                rating = 0.0,
                rating_count = 0,
                claimed_at = excluded.claimed_at,
                claimed_to = excluded.claimed_to,
                last_updated = excluded.last_updated",
            params![server_id, from_source.storage_str(), now, to_source.storage_str()],
        )?;
        drop(conn);

        self.get_stats(server_id, to_source, now)
    }

    /// One-shot upsert of a full row, used by the startup seed import
    /// (§5 timeouts); writes every column verbatim rather than
    /// incrementing counters.
    pub fn seed_stats(&self, row: &ServerStats, now: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_stats (server_id, source, install_count, rating, rating_count, \
                 first_seen, last_updated, active_installs, daily_active_users, monthly_active_users, \
                 claimed_from, claimed_at, claimed_to)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(server_id, source) DO UPDATE SET
                install_count = excluded.install_count,
                rating = excluded.rating,
                rating_count = excluded.rating_count,
                last_updated = excluded.last_updated,
                active_installs = excluded.active_installs,
                daily_active_users = excluded.daily_active_users,
                monthly_active_users = excluded.monthly_active_users",
            params![
                row.server_id,
                row.source.storage_str(),
                row.install_count,
                row.rating,
                row.rating_count,
                if row.first_seen.is_empty() { now } else { &row.first_seen },
                now,
                row.active_installs,
                row.daily_active_users,
                row.monthly_active_users,
                row.claimed_from.map(|s| s.storage_str()),
                row.claimed_at,
                row.claimed_to,
            ],
        )?;
        Ok(())
    }

    /// One-shot: backfill `source = REGISTRY` on rows that predate the
    /// column. The column is `NOT NULL` in this schema, so in practice this
    /// only touches empty-string leftovers from an external bulk import.
    pub fn migrate_legacy(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE server_stats SET source = 'REGISTRY' WHERE source IS NULL OR source = ''",
            [],
        )?;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-01-01T00:00:00Z";

    #[test]
    fn seed_stats_writes_verbatim_row() {
        let store = MetaStore::open_in_memory().unwrap();
        let row = ServerStats {
            server_id: "seeded".to_string(),
            source: Source::Registry,
            install_count: 42,
            rating: 4.5,
            rating_count: 8,
            first_seen: "2025-01-01T00:00:00Z".to_string(),
            last_updated: "2025-01-01T00:00:00Z".to_string(),
            active_installs: Some(10),
            daily_active_users: None,
            monthly_active_users: None,
            claimed_from: None,
            claimed_at: None,
            claimed_to: None,
        };
        store.seed_stats(&row, NOW).unwrap();
        let stats = store.get_stats("seeded", Source::Registry, NOW).unwrap();
        assert_eq!(stats.install_count, 42);
        assert_eq!(stats.rating_count, 8);
        assert_eq!(stats.active_installs, Some(10));
    }

    #[test]
    fn get_recent_days_excludes_older_servers() {
        let store = MetaStore::open_in_memory().unwrap();
        let old_row = ServerStats {
            server_id: "old".to_string(),
            source: Source::Registry,
            install_count: 1,
            rating: 0.0,
            rating_count: 0,
            first_seen: "2020-01-01T00:00:00Z".to_string(),
            last_updated: "2020-01-01T00:00:00Z".to_string(),
            active_installs: None,
            daily_active_users: None,
            monthly_active_users: None,
            claimed_from: None,
            claimed_at: None,
            claimed_to: None,
        };
        store.seed_stats(&old_row, NOW).unwrap();
        store.increment_install("new", Source::Registry, NOW).unwrap();

        let unbounded = store.get_recent(10, Source::Registry, NOW, None).unwrap();
        assert_eq!(unbounded.len(), 2);

        let recent_only = store.get_recent(10, Source::Registry, NOW, Some(7)).unwrap();
        assert_eq!(recent_only.len(), 1);
        assert_eq!(recent_only[0].server_id, "new");
    }

    #[test]
    fn increment_install_upserts_and_accumulates() {
        let store = MetaStore::open_in_memory().unwrap();
        store.increment_install("postgres-tools", Source::Registry, NOW).unwrap();
        store.increment_install("postgres-tools", Source::Registry, NOW).unwrap();
        let stats = store.get_stats("postgres-tools", Source::Registry, NOW).unwrap();
        assert_eq!(stats.install_count, 2);
        assert!(stats.last_updated >= stats.first_seen);
    }

    #[test]
    fn update_rating_converges_to_true_mean_and_loses_nothing() {
        let store = MetaStore::open_in_memory().unwrap();
        for r in [5.0, 3.0, 4.0] {
            store.update_rating("foo", Source::Registry, r, NOW).unwrap();
        }
        let stats = store.get_stats("foo", Source::Registry, NOW).unwrap();
        assert_eq!(stats.rating_count, 3);
        assert!((stats.rating - 4.0).abs() < 1e-6);
    }

    #[test]
    fn get_on_miss_returns_zero_default() {
        let store = MetaStore::open_in_memory().unwrap();
        let stats = store.get_stats("nowhere", Source::Registry, NOW).unwrap();
        assert_eq!(stats.install_count, 0);
        assert_eq!(stats.rating, 0.0);
        assert_eq!(stats.rating_count, 0);
    }

    #[test]
    fn get_aggregated_sums_across_sources() {
        let store = MetaStore::open_in_memory().unwrap();
        store.increment_install("x", Source::Registry, NOW).unwrap();
        store.increment_install("x", Source::Community, NOW).unwrap();
        store.increment_install("x", Source::Community, NOW).unwrap();
        let agg = store.get_aggregated("x", NOW).unwrap();
        assert_eq!(agg.total_installs, 3);
    }

    #[test]
    fn top_by_rating_filters_low_count() {
        let store = MetaStore::open_in_memory().unwrap();
        for _ in 0..5 {
            store.update_rating("popular", Source::Registry, 4.5, NOW).unwrap();
        }
        store.update_rating("unseen", Source::Registry, 5.0, NOW).unwrap();
        let top = store.top_by_rating(10, Source::Registry).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].server_id, "popular");
    }

    #[test]
    fn transfer_merges_and_is_idempotent() {
        let store = MetaStore::open_in_memory().unwrap();
        for _ in 0..100 {
            store.increment_install("x", Source::Community, NOW).unwrap();
        }
        for _ in 0..10 {
            store.update_rating("x", Source::Community, 4.0, NOW).unwrap();
        }
        let first = store.transfer("x", Source::Community, Source::Registry, NOW).unwrap();
        assert_eq!(first.install_count, 100);
        assert_eq!(first.rating_count, 10);
        assert!((first.rating - 4.0).abs() < 1e-6);
        assert_eq!(first.claimed_from, Some(Source::Community));

        let second = store.transfer("x", Source::Community, Source::Registry, NOW).unwrap();
        assert_eq!(second.install_count, first.install_count);
        assert_eq!(second.rating_count, first.rating_count);

        let source_side = store.get_stats("x", Source::Community, NOW).unwrap();
        assert_eq!(source_side.claimed_to, Some("REGISTRY".to_string()));
    }

    #[test]
    fn global_computes_weighted_average() {
        let store = MetaStore::open_in_memory().unwrap();
        store.update_rating("a", Source::Registry, 5.0, NOW).unwrap();
        store.update_rating("b", Source::Registry, 3.0, NOW).unwrap();
        let g = store.global(Source::Registry).unwrap();
        assert_eq!(g.total_servers, 2);
        assert!((g.avg_rating - 4.0).abs() < 1e-6);
    }
}
