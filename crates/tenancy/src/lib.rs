//! Caller-to-shop tenancy resolution.
//!
//! Every query the service emits is scoped to the shops its caller may
//! read. The mapping lives in a DynamoDB table keyed by caller identity;
//! [`effective_allowlist`] then narrows it to an optional request-supplied
//! subset.

pub mod dynamo;

use shopsight_core::Caller;

pub use dynamo::DynamoShopDirectory;

/// Tenancy resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum TenancyError {
    /// The caller is not mapped to any shop.
    #[error("caller {0} has no accessible shops")]
    NotAuthorized(String),

    /// The request named shops, none of which the caller may read.
    #[error("none of the requested shops are accessible to this caller")]
    NoAllowedShopsInRequest,

    /// The mapping store failed.
    #[error("shop directory error: {0}")]
    Store(String),
}

/// Seam over the caller↔shop mapping store.
#[async_trait::async_trait]
pub trait ShopDirectory: Send + Sync {
    /// All shops the caller is allowed to read. May be empty.
    async fn shops_for(&self, caller: &Caller) -> Result<Vec<String>, TenancyError>;
}

/// Compute the effective allowlist for one request.
///
/// `requested` empty means "everything the caller can read". Matching is
/// case-insensitive; the returned list is deduplicated and keeps the casing
/// of whichever input named the shop (requested casing wins for display).
pub fn effective_allowlist(
    caller: &Caller,
    requested: &[String],
    allowed: &[String],
) -> Result<Vec<String>, TenancyError> {
    if allowed.is_empty() {
        return Err(TenancyError::NotAuthorized(caller.user_id.clone()));
    }

    let mut out: Vec<String> = Vec::new();
    let mut seen: Vec<String> = Vec::new();

    let mut push_unique = |shop: &str| {
        let folded = shop.to_lowercase();
        if !seen.contains(&folded) {
            seen.push(folded);
            out.push(shop.to_string());
        }
    };

    if requested.is_empty() {
        for shop in allowed {
            push_unique(shop);
        }
        return Ok(out);
    }

    for shop in requested {
        let folded = shop.to_lowercase();
        if allowed.iter().any(|a| a.to_lowercase() == folded) {
            push_unique(shop);
        }
    }

    if out.is_empty() {
        return Err(TenancyError::NoAllowedShopsInRequest);
    }
    Ok(out)
}
