use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Authenticated caller identity, extracted upstream of the core pipeline.
///
/// Authentication itself happens at the gateway; by the time a request
/// reaches us the identity is opaque and trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    /// Stable user identifier (cache partition key, tenancy lookup key).
    pub user_id: String,
    /// Display email, when the gateway forwards one.
    pub email: Option<String>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
        }
    }
}

/// Body of a natural-language analytics question.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AskRequest {
    /// The question, verbatim.
    pub question: String,
    /// Optional shop subset. Empty means "all shops the caller can read".
    #[serde(default)]
    pub shop_ids: Vec<String>,
}

impl AskRequest {
    /// A question consisting only of whitespace is treated as absent.
    pub fn is_blank(&self) -> bool {
        self.question.trim().is_empty()
    }
}
