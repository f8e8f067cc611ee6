pub mod claim;
pub mod counters;
pub mod feedback;
pub mod stats;

use rusqlite::Connection;
use std::sync::Mutex;

/// Control-plane store: every entity needing atomic per-key upserts lives
/// here behind a single `Mutex<Connection>`.
pub struct MetaStore {
    conn: Mutex<Connection>,
}

impl MetaStore {
    pub fn open(path: &str) -> anyhow::Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS server_stats (
                server_id           TEXT NOT NULL,
                source              TEXT NOT NULL,
                install_count       INTEGER NOT NULL DEFAULT 0,
                rating              REAL NOT NULL DEFAULT 0.0,
                rating_count        INTEGER NOT NULL DEFAULT 0,
                first_seen          TEXT NOT NULL,
                last_updated        TEXT NOT NULL,
                active_installs     INTEGER,
                daily_active_users  INTEGER,
                monthly_active_users INTEGER,
                claimed_from        TEXT,
                claimed_at          TEXT,
                claimed_to          TEXT,
                PRIMARY KEY (server_id, source)
            );
            CREATE INDEX IF NOT EXISTS idx_stats_installs ON server_stats(source, install_count DESC);
            CREATE INDEX IF NOT EXISTS idx_stats_rating ON server_stats(source, rating DESC);
            CREATE INDEX IF NOT EXISTS idx_stats_active ON server_stats(active_installs DESC);
            CREATE INDEX IF NOT EXISTS idx_stats_updated ON server_stats(last_updated DESC);
            CREATE INDEX IF NOT EXISTS idx_stats_first_seen ON server_stats(first_seen DESC);

            CREATE TABLE IF NOT EXISTS server_feedback (
                feedback_id TEXT PRIMARY KEY,
                server_id   TEXT NOT NULL,
                user_id     TEXT NOT NULL,
                source      TEXT NOT NULL,
                rating      INTEGER NOT NULL,
                comment     TEXT NOT NULL DEFAULT '',
                is_public   INTEGER NOT NULL DEFAULT 1,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL,
                UNIQUE(server_id, user_id, source)
            );
            CREATE INDEX IF NOT EXISTS idx_feedback_server ON server_feedback(server_id, source);
            CREATE INDEX IF NOT EXISTS idx_feedback_user ON server_feedback(user_id);

            CREATE TABLE IF NOT EXISTS api_call_metrics (
                endpoint       TEXT NOT NULL,
                method         TEXT NOT NULL,
                count          INTEGER NOT NULL DEFAULT 0,
                error_count    INTEGER NOT NULL DEFAULT 0,
                avg_duration_ms REAL NOT NULL DEFAULT 0.0,
                last_called    TEXT NOT NULL,
                PRIMARY KEY (endpoint, method)
            );

            CREATE TABLE IF NOT EXISTS search_analytics (
                search_term          TEXT PRIMARY KEY,
                count                INTEGER NOT NULL DEFAULT 0,
                results_found        INTEGER NOT NULL DEFAULT 0,
                installs_from_search INTEGER NOT NULL DEFAULT 0,
                success_rate         REAL NOT NULL DEFAULT 0.0,
                last_searched        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS milestones (
                id              TEXT PRIMARY KEY,
                milestone_type  TEXT NOT NULL,
                milestone_value INTEGER NOT NULL,
                achieved_at     TEXT NOT NULL,
                description     TEXT NOT NULL DEFAULT '',
                UNIQUE(milestone_type, milestone_value)
            );

            CREATE TABLE IF NOT EXISTS server_health (
                server_id         TEXT PRIMARY KEY,
                status            TEXT NOT NULL DEFAULT 'unknown',
                response_time_ms  INTEGER NOT NULL DEFAULT 0,
                last_health_check TEXT NOT NULL,
                message           TEXT NOT NULL DEFAULT '',
                availability      REAL NOT NULL DEFAULT 99.9
            );

            CREATE TABLE IF NOT EXISTS server_health_probes (
                server_id    TEXT PRIMARY KEY,
                url          TEXT NOT NULL,
                timeout_secs INTEGER NOT NULL DEFAULT 10
            );

            CREATE TABLE IF NOT EXISTS global_counters (
                id                INTEGER PRIMARY KEY CHECK (id = 1),
                total_installs    INTEGER NOT NULL DEFAULT 0,
                total_ratings     INTEGER NOT NULL DEFAULT 0,
                total_searches    INTEGER NOT NULL DEFAULT 0,
                total_api_calls   INTEGER NOT NULL DEFAULT 0,
                total_api_errors  INTEGER NOT NULL DEFAULT 0
            );
            INSERT OR IGNORE INTO global_counters (id) VALUES (1);

            CREATE TABLE IF NOT EXISTS claim_verification_codes (
                server_id    TEXT PRIMARY KEY,
                code_hash    TEXT NOT NULL,
                expires_at   TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}
