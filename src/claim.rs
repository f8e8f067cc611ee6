use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};

use crate::auth::{AuthService, RegistryClient};
use crate::cache::Cache;
use crate::error::{AppError, AppResult};
use crate::models::claim::{ClaimRequest, ClaimResponse, ClaimState};
use crate::models::source::Source;
use crate::store::MetaStore;
use crate::time::now_string;

pub struct ClaimCoordinator {
    meta: Arc<MetaStore>,
    auth: Arc<dyn AuthService>,
    registry: Arc<dyn RegistryClient>,
    cache: Cache,
}

impl ClaimCoordinator {
    pub fn new(meta: Arc<MetaStore>, auth: Arc<dyn AuthService>, registry: Arc<dyn RegistryClient>, cache: Cache) -> Self {
        Self { meta, auth, registry, cache }
    }

    /// Walks `ClaimState` step by step per §4.9. `FAILED` is reachable from
    /// any step; a `NotFound`/auth error short-circuits before mutating
    /// anything.
    pub async fn execute(&self, server_id: &str, bearer_token: &str, req: ClaimRequest) -> AppResult<ClaimResponse> {
        let mut state = ClaimState::Received;

        if bearer_token.is_empty() {
            return Err(AppError::Unauthorized);
        }
        state = ClaimState::TokenVerified;

        if !self.auth.verify_repo_access(bearer_token, &req.repository).await {
            return Err(AppError::Forbidden);
        }
        state = ClaimState::RepoVerified;

        if let Err(e) = self.registry.upsert_server(server_id, &req.repository).await {
            tracing::warn!("registry upsert failed for {server_id}: {e}");
            return Err(AppError::DependencyUnavailable(e.to_string()));
        }
        state = ClaimState::ServerUpserted;

        let now = now_string();
        let stats = if req.transfer_stats {
            self.meta
                .transfer(server_id, Source::Community, Source::Registry, &now)
                .map_err(|_| AppError::Internal)?;
            state = ClaimState::StatsTransferred;
            Some(self.meta.get_aggregated(server_id, &now).map_err(|_| AppError::Internal)?)
        } else {
            None
        };
        state = ClaimState::Done;
        tracing::debug!("claim {server_id} reached state {state:?}");

        self.cache.delete(&crate::cache::keys::server(server_id)).await;
        self.cache.delete(&crate::cache::keys::stats_aggregated(server_id)).await;
        self.cache.delete(&crate::cache::keys::stats(server_id, Source::Registry.storage_str())).await;
        self.cache.delete(&crate::cache::keys::stats(server_id, Source::Community.storage_str())).await;
        self.cache.invalidate_prefix(crate::cache::keys::servers_prefix()).await;
        self.cache.invalidate_prefix(crate::cache::keys::global_prefix()).await;

        Ok(ClaimResponse {
            success: true,
            message: "claim completed".to_string(),
            server_id: server_id.to_string(),
            stats,
        })
    }

    /// 15-minute opaque verification code, stored hashed the same way API
    /// keys are.
    pub fn generate_verification_code(&self, server_id: &str) -> AppResult<(String, String)> {
        let mut rng = rand::rng();
        let chars: Vec<char> = "abcdefghijklmnopqrstuvwxyz0123456789".chars().collect();
        let code: String = (0..32).map(|_| chars[rng.random_range(0..chars.len())]).collect();

        let mut hasher = Sha256::new();
        hasher.update(code.as_bytes());
        let hash = format!("{:x}", hasher.finalize());

        let expires_at = (Utc::now() + Duration::minutes(15))
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        self.meta
            .set_verification_code(server_id, &hash, &expires_at)
            .map_err(|_| AppError::Internal)?;

        Ok((code, expires_at))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{StubAuthService, StubRegistryClient};

    fn coordinator() -> ClaimCoordinator {
        let meta = Arc::new(MetaStore::open_in_memory().unwrap());
        let cache = crate::cache::spawn(300);
        ClaimCoordinator::new(meta, Arc::new(StubAuthService), Arc::new(StubRegistryClient), cache)
    }

    #[tokio::test]
    async fn missing_bearer_is_unauthorized() {
        let coord = coordinator();
        let req = ClaimRequest { repository: "owner/repo".to_string(), transfer_stats: false };
        let result = coord.execute("srv", "", req).await;
        assert!(matches!(result, Err(AppError::Unauthorized)));
    }

    #[tokio::test]
    async fn claim_without_transfer_succeeds_without_merging() {
        let coord = coordinator();
        let req = ClaimRequest { repository: "owner/repo".to_string(), transfer_stats: false };
        let resp = coord.execute("srv", "token", req).await.unwrap();
        assert!(resp.success);
        assert!(resp.stats.is_none());
    }

    #[test]
    fn verification_code_is_thirty_two_lowercase_alnum_chars() {
        let meta = Arc::new(MetaStore::open_in_memory().unwrap());
        let cache = crate::cache::spawn(300);
        let coord = ClaimCoordinator::new(meta, Arc::new(StubAuthService), Arc::new(StubRegistryClient), cache);
        let (code, _expires) = coord.generate_verification_code("srv").unwrap();
        assert_eq!(code.len(), 32);
        assert!(code.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
