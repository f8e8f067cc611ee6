use async_trait::async_trait;

/// Verifies that a bearer token grants access to a named repository.
/// Delegated to the base registry's auth layer, out of scope for this
/// crate (§1); a stub is provided so the claim flow runs standalone.
#[async_trait]
pub trait AuthService: Send + Sync {
    async fn verify_repo_access(&self, bearer_token: &str, repository: &str) -> bool;
}

/// Upserts the registry-side server entity after a claim. Delegated to the
/// base catalog, out of scope for this crate.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn upsert_server(&self, server_id: &str, repository: &str) -> anyhow::Result<()>;
}

/// Grants access to any non-empty bearer token and repository name.
/// Sufficient to exercise the claim state machine in tests/dev; a real
/// deployment wires a genuine implementation at process init (C0d).
pub struct StubAuthService;

#[async_trait]
impl AuthService for StubAuthService {
    async fn verify_repo_access(&self, bearer_token: &str, repository: &str) -> bool {
        !bearer_token.is_empty() && !repository.is_empty()
    }
}

/// No-op catalog upsert: records nothing, always succeeds.
pub struct StubRegistryClient;

#[async_trait]
impl RegistryClient for StubRegistryClient {
    async fn upsert_server(&self, _server_id: &str, _repository: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_auth_rejects_empty_token() {
        let auth = StubAuthService;
        assert!(!auth.verify_repo_access("", "owner/repo").await);
        assert!(auth.verify_repo_access("token123", "owner/repo").await);
    }
}
