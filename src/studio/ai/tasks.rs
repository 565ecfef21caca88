//! Prompt construction and output shaping for each generation task.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{CompletionProvider, CompletionRequest};
use crate::util::{extract_json_object, truncate_chars};

pub const MAX_BIO_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerateTask {
    Copy,
    Section,
    VcardBio,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedElement {
    pub kind: String,
    #[serde(default = "empty_object")]
    pub content: Value,
    #[serde(default = "empty_object")]
    pub style: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub kind: String,
    #[serde(default = "empty_object")]
    pub content: Value,
    #[serde(default = "empty_object")]
    pub style: Value,
    #[serde(default)]
    pub elements: Vec<GeneratedElement>,
}

fn empty_object() -> Value {
    json!({})
}

/// Result of a generation call, before any persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedOutput {
    Text(String),
    Section(GeneratedSection),
}

const COPY_SYSTEM: &str = "You are a conversion-focused website copywriter. \
Reply with the requested copy only, no preamble and no markdown fences.";

const SECTION_SYSTEM: &str = "You design landing-page sections. Reply with a single JSON object \
of the form {\"kind\": string, \"content\": object, \"style\": object, \"elements\": \
[{\"kind\": string, \"content\": object, \"style\": object}]}. Element kinds are heading, text, \
image, button, link, or html. Text goes in content.text, links in content.href, images in \
content.src and content.alt. Style keys are camelCase CSS properties. Output JSON only.";

const BIO_SYSTEM: &str = "You write short professional bios for digital business cards. \
Write in the first person, at most three sentences, under 500 characters, plain text only.";

pub fn build_request(task: GenerateTask, prompt: &str, context: Option<&Value>) -> CompletionRequest {
    let mut user = prompt.trim().to_string();
    if let Some(context) = context.filter(|c| !c.is_null()) {
        user.push_str("\n\nContext:\n");
        user.push_str(&serde_json::to_string_pretty(context).unwrap_or_default());
    }
    let (system, temperature, max_tokens) = match task {
        GenerateTask::Copy => (COPY_SYSTEM, 0.8, 800),
        GenerateTask::Section => (SECTION_SYSTEM, 0.4, 1500),
        GenerateTask::VcardBio => (BIO_SYSTEM, 0.7, 300),
    };
    CompletionRequest {
        system: Some(system.to_string()),
        prompt: user,
        max_tokens,
        temperature,
    }
}

/// Parse a model's section reply. Anything unusable becomes a `custom`
/// section carrying the raw text.
pub fn parse_section(text: &str) -> GeneratedSection {
    extract_json_object(text)
        .and_then(|json| serde_json::from_str::<GeneratedSection>(&json).ok())
        .filter(|s| !s.kind.trim().is_empty())
        .map(|mut s| {
            s.elements.retain(|e| !e.kind.trim().is_empty());
            coerce_object(&mut s.style);
            for element in &mut s.elements {
                coerce_object(&mut element.style);
            }
            s
        })
        .unwrap_or_else(|| GeneratedSection {
            kind: "custom".into(),
            content: json!({}),
            style: json!({}),
            elements: vec![GeneratedElement {
                kind: "text".into(),
                content: json!({"text": text.trim()}),
                style: json!({}),
            }],
        })
}

/// Models sometimes answer `"style": "bold"`; anything but an object is dropped.
fn coerce_object(value: &mut Value) {
    if !value.is_object() {
        *value = empty_object();
    }
}

pub fn shape_bio(text: &str) -> String {
    let text = text.trim().trim_matches('"').trim();
    truncate_chars(text, MAX_BIO_CHARS).trim_end().to_string()
}

/// Run one task against a provider and shape its output.
pub async fn run_task(
    provider: &dyn CompletionProvider,
    task: GenerateTask,
    prompt: &str,
    context: Option<&Value>,
) -> Result<GeneratedOutput> {
    let request = build_request(task, prompt, context);
    let response = provider.complete(&request).await?;
    tracing::debug!(provider = provider.name(), model = %response.model, ?task, "completion received");
    Ok(match task {
        GenerateTask::Copy => GeneratedOutput::Text(response.text.trim().to_string()),
        GenerateTask::Section => GeneratedOutput::Section(parse_section(&response.text)),
        GenerateTask::VcardBio => GeneratedOutput::Text(shape_bio(&response.text)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::studio::ai::testing::FakeProvider;

    #[test]
    fn test_task_names() {
        let task: GenerateTask = serde_json::from_str("\"vcard_bio\"").unwrap();
        assert_eq!(task, GenerateTask::VcardBio);
        assert!(serde_json::from_str::<GenerateTask>("\"poem\"").is_err());
    }

    #[test]
    fn test_build_request_appends_context() {
        let req = build_request(
            GenerateTask::Copy,
            "Hero headline",
            Some(&json!({"business": "bakery"})),
        );
        assert!(req.prompt.starts_with("Hero headline"));
        assert!(req.prompt.contains("\"business\": \"bakery\""));
        assert!(req.system.unwrap().contains("copywriter"));
    }

    #[test]
    fn test_parse_section_from_fenced_json() {
        let text = r#"Sure! ```json
{"kind": "hero", "content": {"title": "Fresh {daily}"}, "elements": [
  {"kind": "heading", "content": {"text": "Bread"}},
  {"kind": "", "content": {}}
]}
```"#;
        let section = parse_section(text);
        assert_eq!(section.kind, "hero");
        assert_eq!(section.content["title"], "Fresh {daily}");
        assert_eq!(section.style, json!({}));
        assert_eq!(section.elements.len(), 1);
        assert_eq!(section.elements[0].kind, "heading");
    }

    #[test]
    fn test_parse_section_falls_back_to_custom() {
        let section = parse_section("Just some prose about bread.");
        assert_eq!(section.kind, "custom");
        assert_eq!(section.elements[0].kind, "text");
        assert_eq!(section.elements[0].content["text"], "Just some prose about bread.");

        let section = parse_section(r#"{"content": {}}"#);
        assert_eq!(section.kind, "custom");
    }

    #[test]
    fn test_parse_section_drops_non_object_styles() {
        let section = parse_section(
            r#"{"kind":"hero","style":["x"],"elements":[{"kind":"text","style":"bold"},{"kind":"text","style":{"color":"red"}}]}"#,
        );
        assert_eq!(section.style, json!({}));
        assert_eq!(section.elements[0].style, json!({}));
        assert_eq!(section.elements[1].style, json!({"color": "red"}));
    }

    #[test]
    fn test_shape_bio_trims_to_limit() {
        let long = format!("\"{}\"", "é".repeat(700));
        let bio = shape_bio(&long);
        assert_eq!(bio.chars().count(), MAX_BIO_CHARS);
        assert!(!bio.starts_with('"'));
        assert_eq!(shape_bio("  Hi there.  "), "Hi there.");
    }

    #[tokio::test]
    async fn test_run_task_section() {
        let fake = FakeProvider::replying(r#"{"kind":"features","elements":[]}"#);
        let out = run_task(fake.as_ref(), GenerateTask::Section, "Three features", None)
            .await
            .unwrap();
        match out {
            GeneratedOutput::Section(s) => assert_eq!(s.kind, "features"),
            other => panic!("Expected section, got {:?}", other),
        }
        let seen = fake.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].system.as_deref().unwrap().contains("JSON"));
    }

    #[tokio::test]
    async fn test_run_task_propagates_provider_error() {
        let fake = FakeProvider::failing("HTTP 500");
        let err = run_task(fake.as_ref(), GenerateTask::Copy, "x", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<crate::errors::StudioError>(),
            Some(crate::errors::StudioError::Provider { .. })
        ));
    }
}
