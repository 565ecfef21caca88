//! LLM provider adapters.
//!
//! Each adapter maps a [`CompletionRequest`] onto one vendor's HTTP API.
//! The request/response mapping lives in pure `build_body`/`parse_response`
//! functions so it can be tested without a network.

pub mod anthropic;
pub mod gemini;
pub mod openai;
pub mod tasks;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::{AiSettings, ProviderKind, ProviderSettings};
use crate::errors::StudioError;

pub use anthropic::AnthropicProvider;
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionResponse {
    pub text: String,
    pub model: String,
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse>;
}

/// Listing row for `GET /api/ai/providers`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderInfo {
    pub name: String,
    pub kind: ProviderKind,
    pub model: String,
    pub default: bool,
}

/// Send a JSON POST and return the parsed body, mapping transport and
/// non-2xx failures to [`StudioError::Provider`].
pub(crate) async fn post_json(
    provider: &str,
    request: reqwest::RequestBuilder,
    body: &Value,
) -> Result<Value> {
    let failure = |message: String| StudioError::Provider {
        provider: provider.to_string(),
        message,
    };
    let resp = request
        .json(body)
        .send()
        .await
        .map_err(|e| failure(e.to_string()))?;
    let status = resp.status();
    let text = resp.text().await.map_err(|e| failure(e.to_string()))?;
    if !status.is_success() {
        let detail: String = text.chars().take(300).collect();
        return Err(failure(format!("HTTP {}: {}", status.as_u16(), detail)).into());
    }
    serde_json::from_str(&text)
        .map_err(|e| failure(format!("invalid JSON response: {}", e)).into())
}

pub(crate) fn provider_error(provider: &str, message: impl Into<String>) -> anyhow::Error {
    StudioError::Provider {
        provider: provider.to_string(),
        message: message.into(),
    }
    .into()
}

/// Build one adapter from its settings and resolved API key.
pub fn build_provider(
    name: &str,
    settings: &ProviderSettings,
    api_key: String,
    client: reqwest::Client,
) -> Arc<dyn CompletionProvider> {
    match settings.kind {
        ProviderKind::Openai => Arc::new(OpenAiProvider::new(name, settings, api_key, client)),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicProvider::new(name, settings, api_key, client))
        }
        ProviderKind::Gemini => Arc::new(GeminiProvider::new(name, settings, api_key, client)),
    }
}

struct Registered {
    info: ProviderInfo,
    provider: Arc<dyn CompletionProvider>,
}

/// Providers available to this process, keyed by configured name.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Registered>,
    default: Option<String>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config. Providers whose key variable is unset are skipped.
    pub fn from_settings<F>(settings: &AiSettings, lookup_env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;

        let mut registry = Self::new();
        for (name, provider) in &settings.providers {
            match lookup_env(&provider.api_key_env).filter(|k| !k.trim().is_empty()) {
                Some(key) => {
                    let adapter = build_provider(name, provider, key, client.clone());
                    registry.register(name, provider.kind, &provider.model, adapter);
                    tracing::info!(provider = %name, kind = %provider.kind, model = %provider.model, "AI provider enabled");
                }
                None => {
                    tracing::warn!(
                        provider = %name,
                        env = %provider.api_key_env,
                        "AI provider skipped: API key variable not set"
                    );
                }
            }
        }
        registry.default = settings
            .default_provider
            .clone()
            .filter(|name| registry.providers.contains_key(name))
            .or_else(|| registry.providers.keys().next().cloned());
        Ok(registry)
    }

    pub fn register(
        &mut self,
        name: &str,
        kind: ProviderKind,
        model: &str,
        provider: Arc<dyn CompletionProvider>,
    ) {
        self.providers.insert(
            name.to_string(),
            Registered {
                info: ProviderInfo {
                    name: name.to_string(),
                    kind,
                    model: model.to_string(),
                    default: false,
                },
                provider,
            },
        );
        if self.default.is_none() {
            self.default = Some(name.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.providers
            .values()
            .map(|r| ProviderInfo {
                default: self.default.as_deref() == Some(r.info.name.as_str()),
                ..r.info.clone()
            })
            .collect()
    }

    /// Resolve a provider by name, or the default when `name` is `None`.
    pub fn get(&self, name: Option<&str>) -> Result<Arc<dyn CompletionProvider>, StudioError> {
        let name = match name {
            Some(name) => name,
            None => self.default.as_deref().ok_or_else(|| {
                StudioError::ProviderNotConfigured("no AI provider has an API key set".into())
            })?,
        };
        self.providers
            .get(name)
            .map(|r| r.provider.clone())
            .ok_or_else(|| StudioError::ProviderNotConfigured(name.to_string()))
    }
}

/// Join a configured base URL with an API path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}


#[cfg(test)]
mod tests {
    use super::testing::FakeProvider;
    use super::*;
    use crate::config::AiSettings;

    fn env_with(keys: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let keys: Vec<(String, String)> = keys
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| {
            keys.iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn test_registry_skips_providers_without_keys() {
        let settings = AiSettings::default();
        let registry =
            ProviderRegistry::from_settings(&settings, env_with(&[("ANTHROPIC_API_KEY", "k")]))
                .unwrap();
        let names: Vec<String> = registry.list().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["anthropic"]);
        assert_eq!(registry.default_name(), Some("anthropic"));
        assert_eq!(registry.get(None).unwrap().name(), "anthropic");
    }

    #[test]
    fn test_registry_empty_when_no_keys() {
        let registry =
            ProviderRegistry::from_settings(&AiSettings::default(), env_with(&[])).unwrap();
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get(None),
            Err(StudioError::ProviderNotConfigured(_))
        ));
    }

    #[test]
    fn test_registry_honors_configured_default() {
        let mut settings = AiSettings::default();
        settings.default_provider = Some("gemini".into());
        let registry = ProviderRegistry::from_settings(
            &settings,
            env_with(&[("OPENAI_API_KEY", "a"), ("GEMINI_API_KEY", "b")]),
        )
        .unwrap();
        assert_eq!(registry.default_name(), Some("gemini"));
        let listed = registry.list();
        assert!(listed.iter().any(|p| p.name == "gemini" && p.default));
        assert!(listed.iter().any(|p| p.name == "openai" && !p.default));
    }

    #[test]
    fn test_blank_key_counts_as_unset() {
        let registry = ProviderRegistry::from_settings(
            &AiSettings::default(),
            env_with(&[("OPENAI_API_KEY", "  ")]),
        )
        .unwrap();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_unknown_provider_name() {
        let mut registry = ProviderRegistry::new();
        registry.register("fake", ProviderKind::Openai, "m", FakeProvider::replying("x"));
        assert!(registry.get(Some("fake")).is_ok());
        match registry.get(Some("nope")) {
            Err(StudioError::ProviderNotConfigured(name)) => assert_eq!(name, "nope"),
            _ => panic!("Expected ProviderNotConfigured"),
        }
    }

    #[test]
    fn test_endpoint_join() {
        assert_eq!(
            endpoint("https://api.openai.com/", "/v1/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        assert_eq!(endpoint("http://localhost:8080", "v1/messages"), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_completion_request_builder() {
        let req = CompletionRequest::new("hi").with_system("be brief");
        assert_eq!(req.system.as_deref(), Some("be brief"));
        assert_eq!(req.max_tokens, 1024);
    }
}
