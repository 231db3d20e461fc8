//! Chat-completion boundary.
//!
//! [`Generator`] turns a [`GenerationRequest`] into text. The production
//! implementation, [`OpenAIGenerator`], calls
//! `POST {base_url}/chat/completions` through the shared retrying client.

use async_trait::async_trait;
use serde_json::Value;

use crate::config::GenerationConfig;
use crate::error::{QaError, Result};
use crate::http::ApiClient;
use crate::prompt::GenerationRequest;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

#[derive(Debug)]
pub struct OpenAIGenerator {
    model: String,
    client: ApiClient,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig, api_key: String) -> Result<Self> {
        let client = ApiClient::new(
            &config.base_url,
            api_key,
            config.timeout_secs,
            config.max_retries,
        )
        .map_err(QaError::Configuration)?;

        Ok(Self {
            model: config.model.clone(),
            client,
        })
    }

    fn request_body(&self, request: &GenerationRequest) -> Value {
        let messages: Vec<Value> = request
            .all_messages()
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        serde_json::json!({
            "model": self.model,
            "temperature": request.temperature,
            "messages": messages,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = self.request_body(request);
        let json = self
            .client
            .post_json("/chat/completions", &body)
            .await
            .map_err(QaError::Generation)?;
        parse_completion(&json)
    }
}

/// Pull `choices[0].message.content` out of a chat-completion response.
fn parse_completion(json: &Value) -> Result<String> {
    let content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| QaError::Generation("malformed completion response".to_string()))?;

    let content = content.trim();
    if content.is_empty() {
        return Err(QaError::Generation("empty completion".to_string()));
    }
    Ok(content.to_string())
}
