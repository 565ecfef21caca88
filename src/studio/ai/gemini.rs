use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{CompletionProvider, CompletionRequest, CompletionResponse, endpoint, post_json, provider_error};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiProvider {
    name: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
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

pub fn build_body(request: &CompletionRequest, max_tokens: u32) -> Value {
    let mut body = json!({
        "contents": [{"role": "user", "parts": [{"text": request.prompt}]}],
        "generationConfig": {
            "maxOutputTokens": request.max_tokens.min(max_tokens),
            "temperature": request.temperature,
        },
    });
    if let Some(system) = &request.system {
        body["systemInstruction"] = json!({"parts": [{"text": system}]});
    }
    body
}

pub fn parse_response(body: &Value) -> Option<String> {
    let parts = body.pointer("/candidates/0/content/parts")?.as_array()?;
    let text: Vec<&str> = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat())
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = build_body(request, self.max_tokens);
        let url = endpoint(
            &self.base_url,
            &format!("/v1beta/models/{}:generateContent", self.model),
        );
        let req = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())]);
        let resp = post_json(&self.name, req, &body).await?;
        let text = parse_response(&resp)
            .ok_or_else(|| provider_error(&self.name, "response had no candidate text"))?;
        Ok(CompletionResponse {
            text,
            model: self.model.clone(),
        })
    }
}
