use rusqlite::{params, OptionalExtension};

use super::MetaStore;

impl MetaStore {
    /// Replaces any existing code for `server_id`, the same single-row
    /// upsert shape `upsert_health` uses.
    pub fn set_verification_code(&self, server_id: &str, code_hash: &str, expires_at: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO claim_verification_codes (server_id, code_hash, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(server_id) DO UPDATE SET code_hash = excluded.code_hash, expires_at = excluded.expires_at",
            params![server_id, code_hash, expires_at],
        )?;
        Ok(())
    }

    /// Returns the stored `(code_hash, expires_at)`, if any.
    pub fn get_verification_code(&self, server_id: &str) -> anyhow::Result<Option<(String, String)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT code_hash, expires_at FROM claim_verification_codes WHERE server_id = ?1",
                params![server_id],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(row)
    }

    pub fn clear_verification_code(&self, server_id: &str) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM claim_verification_codes WHERE server_id = ?1",
            params![server_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_verification_code_round_trips() {
        let store = MetaStore::open_in_memory().unwrap();
        store.set_verification_code("srv", "hash1", "2026-01-01T00:05:00Z").unwrap();
        let (hash, expires) = store.get_verification_code("srv").unwrap().unwrap();
        assert_eq!(hash, "hash1");
        assert_eq!(expires, "2026-01-01T00:05:00Z");
    }

    #[test]
    fn set_replaces_existing_code() {
        let store = MetaStore::open_in_memory().unwrap();
        store.set_verification_code("srv", "hash1", "2026-01-01T00:05:00Z").unwrap();
        store.set_verification_code("srv", "hash2", "2026-01-01T00:10:00Z").unwrap();
        let (hash, _) = store.get_verification_code("srv").unwrap().unwrap();
        assert_eq!(hash, "hash2");
    }

    #[test]
    fn missing_code_is_none() {
        let store = MetaStore::open_in_memory().unwrap();
        assert!(store.get_verification_code("nope").unwrap().is_none());
    }
}
