/// Process-level configuration, loaded from environment variables (plus an
/// optional `.env` file via `dotenvy`), with `std::env::var` defaults
/// rather than a config file.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub clickhouse_url: String,
    pub clickhouse_database: String,
    pub clickhouse_user: String,
    pub clickhouse_password: String,
    pub analytics_base_url: Option<String>,
    pub analytics_user: Option<String>,
    pub analytics_pass: Option<String>,
    pub cache_ttl_secs: u64,
    pub cors_origins: Vec<String>,
    pub seed_import: bool,
    pub seed_file_path: Option<String>,
    pub health_check_interval_secs: u64,
    pub health_probe_timeout_secs: u64,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let cors_origins = std::env::var("VP_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            database_url: env_or("VP_DATABASE_URL", "./vp_stats.db"),
            clickhouse_url: env_or("VP_CLICKHOUSE_URL", "http://localhost:8123"),
            clickhouse_database: env_or("VP_CLICKHOUSE_DATABASE", "vp_analytics"),
            clickhouse_user: env_or("VP_CLICKHOUSE_USER", "default"),
            clickhouse_password: std::env::var("VP_CLICKHOUSE_PASSWORD").unwrap_or_default(),
            analytics_base_url: std::env::var("VP_ANALYTICS_BASE_URL").ok(),
            analytics_user: std::env::var("VP_ANALYTICS_USER").ok(),
            analytics_pass: std::env::var("VP_ANALYTICS_PASS").ok(),
            cache_ttl_secs: std::env::var("VP_CACHE_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            cors_origins,
            seed_import: std::env::var("VP_SEED_IMPORT")
                .ok()
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            seed_file_path: std::env::var("VP_SEED_FILE_PATH").ok(),
            health_check_interval_secs: std::env::var("VP_HEALTH_CHECK_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(300),
            health_probe_timeout_secs: std::env::var("VP_HEALTH_PROBE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }
}
