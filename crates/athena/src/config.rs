use std::env;

use serde::{Deserialize, Serialize};

// ── Env helpers (mirrors core/config.rs, kept local to avoid circular dep) ──

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries `{PROFILE}_{KEY}` first, falls back to `{KEY}`.
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

fn profiled_env_u64(profile: &str, key: &str, default: u64) -> u64 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_usize(profile: &str, key: &str, default: usize) -> usize {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── AthenaConfig ─────────────────────────────────────────────────

/// Configuration for Athena query execution.
///
/// Reads from environment variables with optional profile prefix.
/// When `SHOPSIGHT_PROFILE=PROD`, checks `PROD_ATHENA_DATABASE` before
/// `ATHENA_DATABASE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AthenaConfig {
    /// AWS region for Athena queries.
    pub region: String,
    /// Athena database name.
    pub database: String,
    /// Athena workgroup.
    pub workgroup: String,
    /// S3 path for query results.
    pub output_location: String,
    /// Absolute deadline across all polls, in milliseconds.
    pub max_wait_ms: u64,
    /// Delay between status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Row cap applied while paging results.
    pub max_rows: usize,
}

impl AthenaConfig {
    /// Build config from environment variables.
    ///
    /// `ATHENA_REGION` falls back to `AWS_REGION` before using the default.
    pub fn from_env() -> Self {
        let profile = env_opt("SHOPSIGHT_PROFILE")
            .map(|s| s.to_uppercase())
            .unwrap_or_default();
        Self::from_env_profiled(&profile)
    }

    /// Build config for a specific named profile.
    pub fn from_env_profiled(profile: &str) -> Self {
        let region = profiled_env_opt(profile, "ATHENA_REGION")
            .or_else(|| profiled_env_opt(profile, "AWS_REGION"))
            .unwrap_or_else(|| "ap-southeast-1".to_string());

        Self {
            region,
            database: profiled_env_or(profile, "ATHENA_DATABASE", "analytics"),
            workgroup: profiled_env_or(profile, "ATHENA_WORKGROUP", "primary"),
            output_location: profiled_env_or(profile, "ATHENA_OUTPUT_LOCATION", ""),
            max_wait_ms: profiled_env_u64(profile, "ATHENA_MAX_WAIT_MS", 25_000),
            poll_interval_ms: profiled_env_u64(profile, "ATHENA_POLL_INTERVAL_MS", 700),
            max_rows: profiled_env_usize(profile, "ATHENA_MAX_ROWS", 200),
        }
    }

    /// Returns `true` when a result output location has been configured.
    pub fn is_configured(&self) -> bool {
        !self.output_location.is_empty()
    }
}

// ── Tests ────────────────────────────────────────────────────────
