use std::env;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_bool(profile: &str, key: &str, default: bool) -> bool {
    match profiled_env_opt(profile, key) {
        Some(v) => matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"),
        None => default,
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub aws: AwsConfig,
    pub postgres: PostgresConfig,
    pub lock: LockConfig,
    pub fetch: FetchConfig,
    pub security: SecurityConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `TIF_PROFILE` env var. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("TIF_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            aws: AwsConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            lock: LockConfig::from_env_profiled(p),
            fetch: FetchConfig::from_env_profiled(p),
            security: SecurityConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  aws:       region={}, endpoint={}", self.aws.region, self.aws.endpoint_url.as_deref().unwrap_or("(default)"));
        tracing::info!("  postgres:  host={}, db={}, configured={}", self.postgres.host, self.postgres.database, self.postgres.is_configured());
        tracing::info!("  lock:      lease={}s, renew_after={}s", self.lock.lease_duration_secs, self.lock.renew_after_secs);
        tracing::info!("  fetch:     max_records={}, batch_size={}", self.fetch.max_records, self.fetch.batch_size);
        tracing::info!("  security:  filter_by_backend_roles={}", self.security.filter_by_backend_roles);
    }

    /// Redacted view of the config (no secrets), printed by `tif-worker show-config`.
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "aws": {
                "region": self.aws.region,
                "endpoint_url": self.aws.endpoint_url,
                "static_credentials": self.aws.has_static_credentials(),
            },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "lock": {
                "lease_duration_secs": self.lock.lease_duration_secs,
                "renew_after_secs": self.lock.renew_after_secs,
            },
            "fetch": {
                "max_records": self.fetch.max_records,
                "batch_size": self.fetch.batch_size,
                "allow_empty_feed": self.fetch.allow_empty_feed,
            },
            "security": { "filter_by_backend_roles": self.security.filter_by_backend_roles },
        })
    }
}

// ── AWS / S3 ──────────────────────────────────────────────────

/// Credentials and endpoint used to reach feed buckets. Bucket, region and
/// role come from each job's source config, not from here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AwsConfig {
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub endpoint_url: Option<String>,
}

impl AwsConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            region: profiled_env_or(p, "AWS_REGION", "us-east-1"),
            access_key_id: profiled_env_opt(p, "AWS_ACCESS_KEY_ID"),
            secret_access_key: profiled_env_opt(p, "AWS_SECRET_ACCESS_KEY"),
            session_token: profiled_env_opt(p, "AWS_SESSION_TOKEN"),
            endpoint_url: profiled_env_opt(p, "AWS_ENDPOINT_URL"),
        }
    }

    pub fn has_static_credentials(&self) -> bool {
        self.access_key_id.is_some() && self.secret_access_key.is_some()
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "tif"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Lock leases ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease granted on acquisition and on every renewal.
    pub lease_duration_secs: u64,
    /// Renewals are skipped until the current lease is at least this old.
    pub renew_after_secs: u64,
}

impl LockConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            lease_duration_secs: profiled_env_u64(p, "TIF_LOCK_DURATION_SECS", 300),
            renew_after_secs: profiled_env_u64(p, "TIF_LOCK_RENEW_AFTER_SECS", 120),
        }
        .clamped()
    }

    /// Pull `renew_after_secs` below the lease, otherwise a held lock would
    /// lapse before the first renewal fires.
    pub fn clamped(self) -> Self {
        if self.lease_duration_secs == 0 || self.renew_after_secs < self.lease_duration_secs {
            return self;
        }
        let renew_after_secs = self.lease_duration_secs / 2;
        tracing::warn!(
            lease = self.lease_duration_secs,
            requested = self.renew_after_secs,
            renew_after = renew_after_secs,
            "lock renew interval not shorter than the lease, clamped"
        );
        Self { renew_after_secs, ..self }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_duration_secs: 300,
            renew_after_secs: 120,
        }
    }
}

// ── Feed fetch ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Upper bound on records pulled by one fetch.
    pub max_records: usize,
    /// Records per bulk write.
    pub batch_size: usize,
    /// Acknowledge ingestion of a feed that yielded no records.
    pub allow_empty_feed: bool,
}

impl FetchConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            max_records: profiled_env_u64(p, "TIF_FETCH_MAX_RECORDS", 10_000) as usize,
            batch_size: profiled_env_u64(p, "TIF_FETCH_BATCH_SIZE", 500).max(1) as usize,
            allow_empty_feed: profiled_env_bool(p, "TIF_ALLOW_EMPTY_FEED", false),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_records: 10_000,
            batch_size: 500,
            allow_empty_feed: false,
        }
    }
}

// ── Security ──────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub filter_by_backend_roles: bool,
}

impl SecurityConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            filter_by_backend_roles: profiled_env_bool(p, "TIF_FILTER_BY_BACKEND_ROLES", false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_key_wins_over_plain_key() {
        env::set_var("TIFCFGA_TIF_LOCK_DURATION_SECS", "42");
        let config = Config::for_profile("tifcfga");
        assert_eq!(config.profile, "TIFCFGA");
        assert_eq!(config.lock.lease_duration_secs, 42);
        env::remove_var("TIFCFGA_TIF_LOCK_DURATION_SECS");
    }

    #[test]
    fn defaults_apply_for_unknown_profile() {
        let config = Config::for_profile("tifcfg_unset");
        assert_eq!(config.fetch.batch_size, 500);
        assert!(!config.postgres.is_configured());
        assert!(config.lock.renew_after_secs < config.lock.lease_duration_secs);
    }

    #[test]
    fn renew_interval_is_clamped_below_the_lease() {
        env::set_var("TIFCFGD_TIF_LOCK_DURATION_SECS", "60");
        env::set_var("TIFCFGD_TIF_LOCK_RENEW_AFTER_SECS", "90");
        let config = Config::for_profile("TIFCFGD");
        assert_eq!(config.lock.lease_duration_secs, 60);
        assert_eq!(config.lock.renew_after_secs, 30);
        env::remove_var("TIFCFGD_TIF_LOCK_DURATION_SECS");
        env::remove_var("TIFCFGD_TIF_LOCK_RENEW_AFTER_SECS");

        let kept = LockConfig { lease_duration_secs: 300, renew_after_secs: 120 }.clamped();
        assert_eq!(kept.renew_after_secs, 120);
    }

    #[test]
    fn bool_flags_parse_loosely() {
        env::set_var("TIFCFGB_TIF_FILTER_BY_BACKEND_ROLES", "TRUE");
        let config = Config::for_profile("TIFCFGB");
        assert!(config.security.filter_by_backend_roles);
        env::remove_var("TIFCFGB_TIF_FILTER_BY_BACKEND_ROLES");
    }

    #[test]
    fn redacted_summary_hides_secrets() {
        env::set_var("TIFCFGC_AWS_SECRET_ACCESS_KEY", "hunter2");
        let config = Config::for_profile("TIFCFGC");
        let json = config.redacted_summary().to_string();
        assert!(!json.contains("hunter2"));
        assert!(json.contains("TIFCFGC"));
        env::remove_var("TIFCFGC_AWS_SECRET_ACCESS_KEY");
    }

    #[test]
    fn profile_label_defaults() {
        let config = Config::for_profile("");
        assert_eq!(config.profile_label(), "default");
    }
}
