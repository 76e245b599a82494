use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One rendered prompt for SQL generation.
///
/// The pipeline renders everything it knows (schema, safety rules, the
/// question) into a single user message; `system` stays available for
/// deployment-level steering and is omitted from the request when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub system: Option<String>,
    pub user: String,
}

impl Prompt {
    /// A prompt with user content only.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            system: None,
            user: content.into(),
        }
    }
}

/// Decoding parameters. SQL generation runs at temperature 0 with a
/// bounded completion length so a repeated request yields the same
/// statement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Decoding {
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Seam over the hosted model APIs. One implementation per backend.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Short backend label for logs.
    fn name(&self) -> &'static str;

    /// Send one completion request and return the assistant's raw text.
    async fn complete(&self, prompt: &Prompt, decoding: &Decoding) -> Result<String, LlmError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    /// Connection, TLS, or timeout failure before an API answer arrived.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with a non-success status (auth, quota, 5xx).
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },

    /// The API answered 200 but the payload did not carry usable text.
    #[error("unusable provider response: {0}")]
    MalformedResponse(String),

    #[error("provider not configured: {0}")]
    NotConfigured(String),
}
