use rusqlite::{params, OptionalExtension, Row};

use super::MetaStore;
use crate::error::{AppError, AppResult};
use crate::models::feedback::{FeedbackSort, ServerFeedback};
use crate::models::source::Source;

fn row_to_feedback(row: &Row) -> rusqlite::Result<ServerFeedback> {
    let source: String = row.get("source")?;
    Ok(ServerFeedback {
        feedback_id: row.get("feedback_id")?,
        server_id: row.get("server_id")?,
        user_id: row.get("user_id")?,
        source: Source::from_storage_str(&source).unwrap_or(Source::Registry),
        rating: row.get("rating")?,
        comment: row.get("comment")?,
        is_public: row.get::<_, i64>("is_public")? != 0,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

const SELECT_COLS: &str =
    "feedback_id, server_id, user_id, source, rating, comment, is_public, created_at, updated_at";

impl MetaStore {
    /// `DuplicateFeedback` on a repeated `(server_id, user_id, source)`, via
    /// the unique-index constraint converted in `error.rs`.
    pub fn create_feedback(
        &self,
        server_id: &str,
        user_id: &str,
        source: Source,
        rating: i64,
        comment: &str,
        is_public: bool,
        now: &str,
    ) -> AppResult<ServerFeedback> {
        let feedback_id = uuid::Uuid::new_v4().to_string();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_feedback
                (feedback_id, server_id, user_id, source, rating, comment, is_public, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                feedback_id,
                server_id,
                user_id,
                source.storage_str(),
                rating,
                comment,
                is_public as i64,
                now,
            ],
        )?;
        Ok(ServerFeedback {
            feedback_id,
            server_id: server_id.to_string(),
            user_id: user_id.to_string(),
            source,
            rating,
            comment: comment.to_string(),
            is_public,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        })
    }

    pub fn get_feedback(&self, feedback_id: &str) -> AppResult<ServerFeedback> {
        let conn = self.conn.lock().unwrap();
        conn.prepare(&format!("SELECT {SELECT_COLS} FROM server_feedback WHERE feedback_id = ?1"))?
            .query_row(params![feedback_id], row_to_feedback)
            .optional()?
            .ok_or(AppError::NotFound)
    }

    pub fn list_feedback(
        &self,
        server_id: &str,
        source: Source,
        limit: i64,
        offset: i64,
        sort: FeedbackSort,
        public_only: bool,
    ) -> AppResult<Vec<ServerFeedback>> {
        let conn = self.conn.lock().unwrap();
        let order_by = sort.order_by_sql();
        let visibility = if public_only { "AND is_public = 1" } else { "" };
        let sql = format!(
            "SELECT {SELECT_COLS} FROM server_feedback \
             WHERE server_id = ?1 AND source = ?2 {visibility} \
             ORDER BY {order_by} LIMIT ?3 OFFSET ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![server_id, source.storage_str(), limit, offset], row_to_feedback)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_user_feedback(
        &self,
        server_id: &str,
        user_id: &str,
        source: Source,
    ) -> AppResult<Option<ServerFeedback>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .prepare(&format!(
                "SELECT {SELECT_COLS} FROM server_feedback \
                 WHERE server_id = ?1 AND user_id = ?2 AND source = ?3"
            ))?
            .query_row(params![server_id, user_id, source.storage_str()], row_to_feedback)
            .optional()?;
        Ok(row)
    }

    pub fn list_feedback_by_user(&self, user_id: &str) -> AppResult<Vec<ServerFeedback>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {SELECT_COLS} FROM server_feedback WHERE user_id = ?1 ORDER BY created_at DESC"
        ))?;
        let rows = stmt
            .query_map(params![user_id], row_to_feedback)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Re-checks `user_id` in the `WHERE` clause; a zero-row update maps to
    /// `NotFound` without distinguishing "wrong user" from "no such
    /// feedback" (§4.4).
    pub fn update_feedback(
        &self,
        feedback_id: &str,
        user_id: &str,
        rating: i64,
        comment: &str,
        now: &str,
    ) -> AppResult<ServerFeedback> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE server_feedback SET rating = ?1, comment = ?2, updated_at = ?3 \
             WHERE feedback_id = ?4 AND user_id = ?5",
            params![rating, comment, now, feedback_id, user_id],
        )?;
        if updated == 0 {
            return Err(AppError::NotFound);
        }
        drop(conn);
        self.get_feedback(feedback_id)
    }

    pub fn delete_feedback(&self, feedback_id: &str, user_id: &str) -> AppResult<()> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM server_feedback WHERE feedback_id = ?1 AND user_id = ?2",
            params![feedback_id, user_id],
        )?;
        if deleted == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    pub fn count_feedback(&self, server_id: &str, source: Source) -> AppResult<i64> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM server_feedback WHERE server_id = ?1 AND source = ?2",
            params![server_id, source.storage_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: &str = "2026-01-01T00:00:00Z";

    #[test]
    fn duplicate_feedback_is_rejected() {
        let store = MetaStore::open_in_memory().unwrap();
        store
            .create_feedback("foo", "u1", Source::Registry, 5, "nice", true, NOW)
            .unwrap();
        let second = store.create_feedback("foo", "u1", Source::Registry, 4, "still nice", true, NOW);
        assert!(matches!(second, Err(AppError::DuplicateFeedback)));
    }

    #[test]
    fn update_requires_matching_user() {
        let store = MetaStore::open_in_memory().unwrap();
        let fb = store
            .create_feedback("foo", "u1", Source::Registry, 5, "nice", true, NOW)
            .unwrap();
        let result = store.update_feedback(&fb.feedback_id, "u2", 1, "mine now", NOW);
        assert!(matches!(result, Err(AppError::NotFound)));
    }

    #[test]
    fn delete_requires_matching_user() {
        let store = MetaStore::open_in_memory().unwrap();
        let fb = store
            .create_feedback("foo", "u1", Source::Registry, 5, "nice", true, NOW)
            .unwrap();
        assert!(matches!(
            store.delete_feedback(&fb.feedback_id, "u2"),
            Err(AppError::NotFound)
        ));
        assert!(store.delete_feedback(&fb.feedback_id, "u1").is_ok());
    }

    #[test]
    fn sort_rating_high_breaks_ties_by_created_at_desc() {
        let store = MetaStore::open_in_memory().unwrap();
        store.create_feedback("foo", "u1", Source::Registry, 5, "a", true, "2026-01-01T00:00:00Z").unwrap();
        store.create_feedback("foo", "u2", Source::Registry, 5, "b", true, "2026-01-02T00:00:00Z").unwrap();
        let rows = store
            .list_feedback("foo", Source::Registry, 20, 0, FeedbackSort::RatingHigh, true)
            .unwrap();
        assert_eq!(rows[0].user_id, "u2");
    }
}
