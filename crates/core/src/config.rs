use std::env;

use chrono_tz::Tz;
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

fn profiled_env_f32(profile: &str, key: &str, default: f32) -> f32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub catalog: CatalogConfig,
    pub llm: LlmConfig,
    pub policy: PolicyConfig,
    pub stores: StoresConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `SHOPSIGHT_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("SHOPSIGHT_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            catalog: CatalogConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            policy: PolicyConfig::from_env_profiled(p),
            stores: StoresConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:   {}:{}", self.server.host, self.server.port);
        tracing::info!("  catalog:  {}.{}", self.catalog.database, self.catalog.table);
        tracing::info!("  llm:      provider={}", self.llm.provider);
        tracing::info!(
            "  policy:   lookback={}d, tz={}, fix_attempts={}, cache_ttl={}s",
            self.policy.max_days_lookback,
            self.policy.timezone,
            self.policy.max_fix_attempts,
            self.policy.cache_ttl_seconds,
        );
        tracing::info!(
            "  stores:   cache={}, tenancy={}",
            self.stores.cache_table,
            self.stores.tenancy_table,
        );
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            host: profiled_env_or(profile, "SERVER_HOST", "0.0.0.0"),
            port: profiled_env_u16(profile, "SERVER_PORT", 8080),
        }
    }
}

// ── Catalog ───────────────────────────────────────────────────

/// Which Glue database/table holds the partitioned analytics data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub database: String,
    pub table: String,
}

impl CatalogConfig {
    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            database: profiled_env_or(profile, "GLUE_DATABASE", "analytics"),
            table: profiled_env_or(profile, "GLUE_TABLE", "daily_metrics"),
        }
    }
}

// ── LLM ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "claude" or "openai".
    pub provider: String,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    /// 0.0 keeps SQL generation deterministic.
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            provider: profiled_env_or(profile, "LLM_PROVIDER", "claude"),
            anthropic_api_key: profiled_env_opt(profile, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(
                profile,
                "ANTHROPIC_MODEL",
                "claude-sonnet-4-20250514",
            ),
            openai_api_key: profiled_env_opt(profile, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(profile, "OPENAI_MODEL", "gpt-4o-mini"),
            openai_base_url: profiled_env_opt(profile, "OPENAI_BASE_URL"),
            temperature: profiled_env_f32(profile, "LLM_TEMPERATURE", 0.0),
            max_tokens: profiled_env_u32(profile, "LLM_MAX_TOKENS", 1200),
        }
    }
}

// ── Policy ────────────────────────────────────────────────────

/// Safety policy applied to every generated query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Oldest partition a query may touch, in days before today. Clamped to [1, 90].
    pub max_days_lookback: u32,
    /// IANA timezone used to compute "today".
    pub timezone: String,
    /// Repair rounds after a failed execution.
    pub max_fix_attempts: u32,
    /// Result cache TTL in seconds.
    pub cache_ttl_seconds: u64,
}

impl PolicyConfig {
    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            max_days_lookback: profiled_env_u32(profile, "NLQ_MAX_DAYS_LOOKBACK", 90)
                .clamp(1, 90),
            timezone: profiled_env_or(profile, "NLQ_TIMEZONE", "Asia/Ho_Chi_Minh"),
            max_fix_attempts: profiled_env_u32(profile, "NLQ_MAX_FIX_ATTEMPTS", 2),
            cache_ttl_seconds: profiled_env_u64(profile, "NLQ_CACHE_TTL_SECONDS", 600),
        }
    }

    /// Parsed timezone, falling back to UTC if the name is unknown.
    pub fn tz(&self) -> Tz {
        self.timezone.parse().unwrap_or_else(|_| {
            tracing::warn!("Unknown timezone '{}', falling back to UTC", self.timezone);
            Tz::UTC
        })
    }
}

// ── Persistent stores ─────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoresConfig {
    /// DynamoDB table for the per-caller result cache.
    pub cache_table: String,
    /// DynamoDB table mapping caller identity to readable shops.
    pub tenancy_table: String,
}

impl StoresConfig {
    pub fn from_env_profiled(profile: &str) -> Self {
        Self {
            cache_table: profiled_env_or(profile, "NLQ_CACHE_TABLE", "nlq-cache"),
            tenancy_table: profiled_env_or(profile, "TENANCY_TABLE", "shop-members"),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────
