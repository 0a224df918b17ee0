//! Text-generation collaborator: an OpenAI-Responses-style API.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{GenerationInput, GenerationReply, TextGenerator, UpstreamError};
use crate::config::GenerationConfig;

const SERVICE: &str = "generation";

pub struct ResponsesClient {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl ResponsesClient {
    pub fn new(config: &GenerationConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// First `output_text` block of the first output item.
    fn extract_text(body: &Value) -> Option<String> {
        let content = body["output"].as_array()?.first()?["content"].as_array()?;
        content
            .iter()
            .find(|c| c["type"].as_str() == Some("output_text"))
            .or_else(|| content.first())
            .and_then(|c| c["text"].as_str())
            .map(|t| t.trim().to_string())
    }
}

#[async_trait]
impl TextGenerator for ResponsesClient {
    async fn generate(&self, input: &GenerationInput) -> Result<GenerationReply, UpstreamError> {
        let resp = self
            .http
            .post(format!("{}/v1/responses", self.api_base))
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": input.model,
                "input": input.turns,
                "max_output_tokens": input.max_output_tokens,
            }))
            .send()
            .await
            .map_err(|e| UpstreamError::Transport {
                service: SERVICE,
                message: e.to_string(),
            })?;

        let status = resp.status().as_u16();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !(200..300).contains(&status) {
            let message = body["error"]["message"]
                .as_str()
                .unwrap_or("request rejected")
                .to_string();
            return Err(UpstreamError::Api {
                service: SERVICE,
                status,
                message,
            });
        }

        let text = Self::extract_text(&body).filter(|t| !t.is_empty()).ok_or_else(|| {
            UpstreamError::Shape {
                service: SERVICE,
                message: "response contains no output text".into(),
            }
        })?;

        let incomplete =
            body["status"].as_str() == Some("incomplete") || !body["incomplete_details"].is_null();

        Ok(GenerationReply { text, incomplete })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
