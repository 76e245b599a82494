use std::sync::LazyLock;

use chrono::{Duration, NaiveDate};
use regex::Regex;
use serde::Serialize;

/// Options for one validation run.
#[derive(Debug, Clone)]
pub struct ValidateOptions {
    /// Shops the caller may read. Empty disables the tenant check
    /// (only internal, non-tenant-bounded calls do that).
    pub allowed_shops: Vec<String>,
    /// Whether `dt` must appear at all.
    pub require_partition_filter: bool,
    /// Oldest permitted lower bound, in days before `today`. Range [1, 90].
    pub max_days_lookback: u32,
    /// Local calendar date the request started on.
    pub today: NaiveDate,
}

impl ValidateOptions {
    /// Oldest date a partition lower bound may name.
    pub fn min_allowed(&self) -> NaiveDate {
        self.today - Duration::days(self.max_days_lookback as i64)
    }
}

/// Why a candidate statement was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum RejectReason {
    #[error("sql is empty")]
    EmptySql,

    #[error("only a single SELECT statement is allowed")]
    NotSelect,

    #[error("forbidden sequence: {0}")]
    ForbiddenSequence(String),

    #[error("forbidden keyword: {0}")]
    ForbiddenKeyword(String),

    #[error("dt partition filter is required")]
    DtFilterMissing,

    #[error("dt filter must include a lower bound")]
    DtLowerBoundMissing,

    #[error("dt lower bound {bound} is older than {min_allowed}")]
    DtLowerBoundTooOld { bound: String, min_allowed: String },

    #[error("invalid date literal: {0}")]
    BadDateLiteral(String),

    #[error("shop_id filter is required")]
    ShopFilterMissing,

    #[error("shop_id value not allowed: {0}")]
    ShopNotAllowed(String),
}

// Matchers run against the lowercased, whitespace-collapsed copy.
// Column references tolerate a table-alias qualifier (`d.dt`).

static FORBIDDEN_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(insert|update|delete|merge|drop|alter|create|truncate|grant|revoke|call|execute|prepare|deallocate)\b",
    )
    .unwrap()
});

static STARTS_READONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(select|with)\b").unwrap());

static DT_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[a-z_][a-z0-9_]*\.)?dt\b").unwrap());

static DT_BETWEEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:[a-z_][a-z0-9_]*\.)?dt\s+between\s+(?:date\s+)?'([^']*)'\s+and\s+(?:date\s+)?'[^']*'",
    )
    .unwrap()
});

static DT_LOWER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-z_][a-z0-9_]*\.)?dt\s*>\s*=?\s*(?:date\s+)?'([^']*)'").unwrap()
});

static SHOP_EQ: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-z_][a-z0-9_]*\.)?shop_id\s*=\s*'([^']*)'").unwrap()
});

static SHOP_IN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:[a-z_][a-z0-9_]*\.)?shop_id\s+in\s*\(([^)]*)\)").unwrap()
});

static QUOTED_LITERAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'([^']*)'").unwrap());

/// Whether the statement carries any textual partition lower bound
/// (`dt BETWEEN …`, `dt >= …`, `dt > …`).
pub fn has_partition_lower_bound(sql: &str) -> bool {
    let norm = normalize_sql(sql);
    DT_BETWEEN.is_match(&norm) || DT_LOWER.is_match(&norm)
}

/// Lowercase and collapse all whitespace runs to single spaces.
pub fn normalize_sql(sql: &str) -> String {
    sql.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Check one candidate statement against the safety contract.
pub fn validate(sql: &str, opts: &ValidateOptions) -> Result<(), RejectReason> {
    let norm = normalize_sql(sql);

    if norm.is_empty() {
        return Err(RejectReason::EmptySql);
    }

    if !STARTS_READONLY.is_match(&norm) {
        return Err(RejectReason::NotSelect);
    }

    for seq in [";", "--", "/*", "*/"] {
        if norm.contains(seq) {
            return Err(RejectReason::ForbiddenSequence(seq.to_string()));
        }
    }

    if let Some(m) = FORBIDDEN_KEYWORD.find(&norm) {
        return Err(RejectReason::ForbiddenKeyword(m.as_str().to_string()));
    }

    check_partition_bound(&norm, opts)?;
    check_tenancy(&norm, opts)?;

    Ok(())
}

/// Enforce the partition-pruning floor on `dt`.
///
/// Every matched lower bound must satisfy the floor, including bounds on
/// `OR` branches elsewhere in the statement.
fn check_partition_bound(norm: &str, opts: &ValidateOptions) -> Result<(), RejectReason> {
    let mut bounds: Vec<String> = Vec::new();
    for cap in DT_BETWEEN.captures_iter(norm) {
        bounds.push(cap[1].to_string());
    }
    for cap in DT_LOWER.captures_iter(norm) {
        bounds.push(cap[1].to_string());
    }

    if bounds.is_empty() {
        if DT_MENTION.is_match(norm) {
            return Err(RejectReason::DtLowerBoundMissing);
        }
        if opts.require_partition_filter {
            return Err(RejectReason::DtFilterMissing);
        }
        return Ok(());
    }

    let min_allowed = opts.min_allowed();
    for bound in bounds {
        let date = NaiveDate::parse_from_str(&bound, "%Y-%m-%d")
            .map_err(|_| RejectReason::BadDateLiteral(bound.clone()))?;
        if date < min_allowed {
            return Err(RejectReason::DtLowerBoundTooOld {
                bound,
                min_allowed: min_allowed.to_string(),
            });
        }
    }
    Ok(())
}

/// Every `shop_id` literal must be in the allowlist (case-insensitive).
fn check_tenancy(norm: &str, opts: &ValidateOptions) -> Result<(), RejectReason> {
    if opts.allowed_shops.is_empty() {
        return Ok(());
    }

    let allowed: Vec<String> = opts
        .allowed_shops
        .iter()
        .map(|s| s.to_lowercase())
        .collect();

    let mut literals: Vec<String> = Vec::new();
    for cap in SHOP_EQ.captures_iter(norm) {
        literals.push(cap[1].to_string());
    }
    for cap in SHOP_IN.captures_iter(norm) {
        for lit in QUOTED_LITERAL.captures_iter(&cap[1]) {
            literals.push(lit[1].to_string());
        }
    }

    if literals.is_empty() {
        return Err(RejectReason::ShopFilterMissing);
    }

    // The normalized copy is already lowercase; compare folded to folded.
    for lit in literals {
        if !allowed.iter().any(|a| *a == lit) {
            return Err(RejectReason::ShopNotAllowed(lit));
        }
    }
    Ok(())
}
