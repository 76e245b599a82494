//! Typed model client for SQL generation.
//!
//! The model reply is untrusted text. The only accepted shape is a single
//! top-level JSON object carrying the generation contract; everything else
//! is a protocol error. Decoding runs at temperature 0 with a bounded
//! completion length, so a given prompt yields a stable reply.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::provider::{Decoding, LlmError, LlmProvider, Prompt};

/// Parsed model output: either SQL with metadata, or a clarification request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmReply {
    #[serde(default)]
    pub sql: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub assumptions: Vec<String>,
    #[serde(default)]
    pub needs_clarification: bool,
    #[serde(default)]
    pub clarifying_question: Option<String>,
}

impl LlmReply {
    /// The SQL candidate, when the model did not ask for clarification.
    pub fn sql_candidate(&self) -> Option<&str> {
        if self.needs_clarification {
            None
        } else {
            self.sql.as_deref().filter(|s| !s.trim().is_empty())
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// I/O, HTTP, or auth failure talking to the provider.
    #[error("model transport error: {0}")]
    Transport(LlmError),
    /// The reply does not conform to the JSON-object contract.
    #[error("model protocol error: {0}")]
    Protocol(String),
}

/// Deterministic model invocation returning a typed [`LlmReply`].
pub struct NlqModel {
    provider: Box<dyn LlmProvider>,
    decoding: Decoding,
}

impl NlqModel {
    pub fn new(provider: Box<dyn LlmProvider>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            provider,
            decoding: Decoding {
                temperature,
                max_tokens,
            },
        }
    }

    pub async fn invoke(&self, prompt: &str) -> Result<LlmReply, ModelError> {
        let raw = self
            .provider
            .complete(&Prompt::user(prompt), &self.decoding)
            .await
            .map_err(|e| match e {
                LlmError::MalformedResponse(msg) => ModelError::Protocol(msg),
                other => ModelError::Transport(other),
            })?;

        debug!(
            provider = self.provider.name(),
            chars = raw.len(),
            "Model reply received"
        );

        parse_reply(&raw)
    }
}

/// Parse the first balanced JSON object out of a raw model reply.
pub fn parse_reply(raw: &str) -> Result<LlmReply, ModelError> {
    let json_str = extract_json_object(raw)
        .ok_or_else(|| ModelError::Protocol("no JSON object in reply".into()))?;

    let reply: LlmReply = serde_json::from_str(json_str)
        .map_err(|e| ModelError::Protocol(format!("malformed JSON object: {}", e)))?;

    if !reply.needs_clarification && reply.sql_candidate().is_none() {
        return Err(ModelError::Protocol(
            "reply carries neither SQL nor a clarification".into(),
        ));
    }
    if reply.needs_clarification
        && reply
            .clarifying_question
            .as_deref()
            .map(str::trim)
            .unwrap_or("")
            .is_empty()
    {
        return Err(ModelError::Protocol(
            "clarification requested without a question".into(),
        ));
    }
    if !(0.0..=1.0).contains(&reply.confidence) {
        return Err(ModelError::Protocol(format!(
            "confidence {} outside [0,1]",
            reply.confidence
        )));
    }

    Ok(reply)
}

/// Slice out the first balanced top-level `{…}` object, ignoring braces
/// inside string literals and escaped quotes. Prose before or after the
/// object is tolerated.
fn extract_json_object(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = text.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}
