use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Value, json};

use super::{CompletionProvider, CompletionRequest, CompletionResponse, endpoint, post_json, provider_error};
use crate::config::ProviderSettings;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// OpenAI chat completions. Any compatible server works through `base_url`.
pub struct OpenAiProvider {
    name: String,
    model: String,
    base_url: String,
    max_tokens: u32,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
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
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({"role": "system", "content": system}));
    }
    messages.push(json!({"role": "user", "content": request.prompt}));
    json!({
        "model": model,
        "messages": messages,
        "max_tokens": request.max_tokens.min(max_tokens),
        "temperature": request.temperature,
    })
}

/// Concatenated text of the first choice.
pub fn parse_response(body: &Value) -> Option<String> {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse> {
        let body = build_body(&self.model, request, self.max_tokens);
        let req = self
            .client
            .post(endpoint(&self.base_url, "/v1/chat/completions"))
            .bearer_auth(&self.api_key);
        let resp = post_json(&self.name, req, &body).await?;
        let text = parse_response(&resp)
            .ok_or_else(|| provider_error(&self.name, "response had no message content"))?;
        let model = resp
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model)
            .to_string();
        Ok(CompletionResponse { text, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_body_with_system() {
        let req = CompletionRequest::new("Write a tagline").with_system("You write copy.");
        let body = build_body("gpt-4o-mini", &req, 512);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You write copy.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "Write a tagline");
        // Capped by the configured ceiling.
        assert_eq!(body["max_tokens"], 512);
    }

    #[test]
    fn test_build_body_without_system() {
        let body = build_body("m", &CompletionRequest::new("hi"), 4096);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["max_tokens"], 1024);
    }

    #[test]
    fn test_parse_response() {
        let body = json!({
            "model": "gpt-4o-mini-2024",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Build faster."}}]
        });
        assert_eq!(parse_response(&body).as_deref(), Some("Build faster."));
        assert_eq!(parse_response(&json!({"choices": []})), None);
    }
}
