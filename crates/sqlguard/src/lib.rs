//! Safety contract for model-generated SQL.
//!
//! Candidate SQL is untrusted model output. Before anything reaches the
//! query engine it must pass a set of lexical, case-insensitive checks over
//! a whitespace-normalized copy:
//!
//! - a single read-only `SELECT` (or `WITH`) statement, no comments or `;`
//! - no DML/DDL keywords anywhere, matched on word boundaries
//! - a partition predicate on `dt` whose lower bound is no older than
//!   `today − max_days_lookback`
//! - a tenant predicate on `shop_id` whose every literal is in the caller's
//!   allowlist
//!
//! The validator never rewrites SQL. Rejections are enum-tagged so callers
//! can surface the exact reason.

pub mod validate;

pub use validate::{
    has_partition_lower_bound, normalize_sql, validate, RejectReason, ValidateOptions,
};
