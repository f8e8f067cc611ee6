use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

#[derive(Clone)]
struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

/// Process-local TTL cache. Spawns its own sweeper at construction, handing
/// back a cheaply-`Clone`able handle.
#[derive(Clone)]
pub struct Cache {
    inner: Arc<RwLock<HashMap<String, CacheEntry>>>,
    ttl: Duration,
}

/// Spawn the cache's background sweeper and return the handle.
pub fn spawn(ttl_secs: u64) -> Cache {
    let cache = Cache {
        inner: Arc::new(RwLock::new(HashMap::new())),
        ttl: Duration::from_secs(ttl_secs),
    };
    let sweep_handle = cache.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(sweep_handle.ttl.max(Duration::from_secs(1)));
        loop {
            interval.tick().await;
            sweep_handle.sweep().await;
        }
    });
    cache
}

impl Cache {
    pub async fn get(&self, key: &str) -> Option<serde_json::Value> {
        let guard = self.inner.read().await;
        match guard.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            _ => None,
        }
    }

    pub async fn set(&self, key: impl Into<String>, value: serde_json::Value) {
        let mut guard = self.inner.write().await;
        guard.insert(
            key.into(),
            CacheEntry {
                value,
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    pub async fn delete(&self, key: &str) {
        let mut guard = self.inner.write().await;
        guard.remove(key);
    }

    /// Invalidates every key sharing `prefix`, e.g. `vp:servers:`.
    pub async fn invalidate_prefix(&self, prefix: &str) {
        let mut guard = self.inner.write().await;
        guard.retain(|k, _| !k.starts_with(prefix));
    }

    async fn sweep(&self) {
        let now = Instant::now();
        let mut guard = self.inner.write().await;
        guard.retain(|_, entry| entry.expires_at > now);
    }
}

/// Cache keys scoped per §4.2.
pub mod keys {
    pub fn server(id: &str) -> String {
        format!("vp:server:{id}")
    }

    pub fn stats(id: &str, source: &str) -> String {
        format!("vp:stats:{id}:{source}")
    }

    pub fn stats_aggregated(id: &str) -> String {
        format!("vp:stats:{id}:aggregated")
    }

    pub fn servers_prefix() -> &'static str {
        "vp:servers:"
    }

    pub fn servers(querystring: &str) -> String {
        format!("vp:servers:{querystring}")
    }

    pub fn dashboard(period: &str) -> String {
        format!("vp:dashboard:{period}")
    }

    pub fn leaderboard(kind: &str, limit: i64, source: &str) -> String {
        format!("vp:leaderboard:{kind}:{limit}:{source}")
    }

    pub fn global_prefix() -> &'static str {
        "vp:stats:global"
    }

    pub fn global(source: &str) -> String {
        format!("vp:stats:global:{source}")
    }

    pub fn feedback_prefix(id: &str, source: &str) -> String {
        format!("vp:feedback:{id}:{source}")
    }

    pub fn feedback(id: &str, source: &str, limit: i64, offset: i64, sort: &str) -> String {
        format!("vp:feedback:{id}:{source}:{limit}:{offset}:{sort}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get_hits() {
        let cache = spawn(60);
        cache.set("k", serde_json::json!({"a":1})).await;
        assert_eq!(cache.get("k").await, Some(serde_json::json!({"a":1})));
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = spawn(60);
        assert_eq!(cache.get("nope").await, None);
    }

    #[tokio::test]
    async fn delete_invalidates() {
        let cache = spawn(60);
        cache.set("k", serde_json::json!(1)).await;
        cache.delete("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn invalidate_prefix_clears_matching_keys_only() {
        let cache = spawn(60);
        cache.set("vp:servers:a", serde_json::json!(1)).await;
        cache.set("vp:servers:b", serde_json::json!(2)).await;
        cache.set("vp:stats:x", serde_json::json!(3)).await;
        cache.invalidate_prefix("vp:servers:").await;
        assert_eq!(cache.get("vp:servers:a").await, None);
        assert_eq!(cache.get("vp:servers:b").await, None);
        assert!(cache.get("vp:stats:x").await.is_some());
    }

    #[tokio::test]
    async fn entries_expire_after_ttl() {
        let cache = Cache {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::from_millis(10),
        };
        cache.set("k", serde_json::json!(1)).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("k").await, None);
    }
}
