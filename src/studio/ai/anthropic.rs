use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{CompletionProvider, CompletionRequest, CompletionResponse, endpoint, post_json, provider_error};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const API_VERSION: &str = "2023-06-01";

pub struct AnthropicProvider {
    name: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(name: &str, settings: &ProviderSettings, api_key: String, client: reqwest::Client) -> Self {
        Self {
            name: name.to_string(),
            model: settings.model.clone(),
            base_url: settings
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_tokens: settings.max_tokens,
            api_key,
            client,
        }
    }
}

pub fn build_body(model: &str, request: &CompletionRequest, max_tokens: u32) -> Value {
    let mut body = json!({
        "model": model,
        "max_tokens": request.max_tokens.min(max_tokens),
        "temperature": request.temperature,
        "messages": [{"role": "user", "content": request.prompt}],
    });
    if let Some(system) = &request.system {
        body["system"] = json!(system);
    }
    body
}

/// Joined text blocks of the reply.
pub fn parse_response(body: &Value) -> Option<String> {
    let blocks = body.get("content")?.as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat())
    }
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = build_body(&self.model, request, self.max_tokens);
        let req = self
            .client
            .post(endpoint(&self.base_url, "/v1/messages"))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION);
        let resp = post_json(&self.name, req, &body).await?;
        let text = parse_response(&resp)
            .ok_or_else(|| provider_error(&self.name, "response had no text blocks"))?;
        let model = resp
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model)
            .to_string();
        Ok(CompletionResponse { text, model })
    }
}
