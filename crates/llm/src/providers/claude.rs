//! Anthropic Messages API backend.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::provider::{Decoding, LlmError, LlmProvider, Prompt};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";

pub struct ClaudeProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl ClaudeProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
        }
    }
}

/// The slice of the Messages response we read; everything else is ignored.
#[derive(Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[async_trait]
impl LlmProvider for ClaudeProvider {
    fn name(&self) -> &'static str {
        "claude"
    }

    async fn complete(&self, prompt: &Prompt, decoding: &Decoding) -> Result<String, LlmError> {
        let mut body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt.user }],
            "temperature": decoding.temperature,
            "max_tokens": decoding.max_tokens,
        });
        // The Messages API takes the system preamble as a top-level field.
        if let Some(system) = &prompt.system {
            body["system"] = json!(system);
        }

        debug!(model = %self.model, "Claude request");

        let response = self
            .client
            .post(API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(LlmError::Api {
                provider: self.name(),
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: MessagesResponse = serde_json::from_str(&text)
            .map_err(|e| LlmError::MalformedResponse(format!("claude payload: {}", e)))?;

        parsed
            .content
            .into_iter()
            .map(|block| block.text)
            .find(|t| !t.is_empty())
            .ok_or_else(|| LlmError::MalformedResponse("claude reply had no text block".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_payload_parses() {
        let raw = r#"{"id":"msg_1","content":[{"type":"text","text":"{\"sql\":\"SELECT 1\"}"}],"model":"m"}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.content.len(), 1);
        assert!(parsed.content[0].text.contains("SELECT 1"));
    }

    #[test]
    fn non_text_blocks_are_skipped() {
        let raw = r#"{"content":[{"type":"thinking"},{"type":"text","text":"answer"}]}"#;
        let parsed: MessagesResponse = serde_json::from_str(raw).unwrap();
        let text = parsed
            .content
            .into_iter()
            .map(|b| b.text)
            .find(|t| !t.is_empty());
        assert_eq!(text.as_deref(), Some("answer"));
    }
}
