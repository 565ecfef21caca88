use axum::{extract::State, response::IntoResponse};
use serde::Deserialize;
use serde_json::{Value, json};

use super::extract::Json;
use super::{ApiError, SharedState};
use crate::errors::StudioError;
use crate::studio::ai::tasks::{GenerateTask, GeneratedOutput, GeneratedSection, run_task};
use crate::studio::auth::AuthUser;
use crate::studio::events::{StudioEvent, publish};
use crate::studio::models::{NewElement, NewSection, SectionDetail};

#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub provider: Option<String>,
    pub task: GenerateTask,
    pub prompt: String,
    pub context: Option<Value>,
    /// With `task = section`, persist the result at the end of this page.
    pub page_id: Option<i64>,
}

pub async fn list_providers(State(state): State<SharedState>) -> impl IntoResponse {
    Json(state.ai.list())
}

pub async fn generate(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(req): Json<GenerateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.prompt.trim().is_empty() {
        return Err(StudioError::Validation("prompt must not be empty".into()).into());
    }
    if req.page_id.is_some() && req.task != GenerateTask::Section {
        return Err(StudioError::Validation("page_id is only accepted with task=section".into()).into());
    }
    let user_id = user.id;
    if let Some(page_id) = req.page_id {
        state.db.call(move |db| db.owned_page(user_id, page_id)).await?;
    }

    let provider = state.ai.get(req.provider.as_deref())?;
    tracing::info!(user_id, provider = provider.name(), task = ?req.task, "generation requested");
    let output = run_task(provider.as_ref(), req.task, &req.prompt, req.context.as_ref())
        .await
        .inspect_err(|e| tracing::warn!(user_id, provider = provider.name(), error = %e, "generation failed"))?;

    let body = match (output, req.page_id) {
        (GeneratedOutput::Text(text), _) => json!({ "text": text }),
        (GeneratedOutput::Section(section), None) => json!({ "section": section }),
        (GeneratedOutput::Section(section), Some(page_id)) => {
            let detail = persist_section(&state, user_id, page_id, section).await?;
            json!({ "section": detail })
        }
    };
    Ok(Json(body))
}

async fn persist_section(
    state: &SharedState,
    user_id: i64,
    page_id: i64,
    generated: GeneratedSection,
) -> Result<SectionDetail, ApiError> {
    let section = NewSection {
        kind: generated.kind,
        position: None,
        content: Some(generated.content),
        style: Some(generated.style),
    };
    let elements: Vec<NewElement> = generated
        .elements
        .into_iter()
        .map(|element| NewElement {
            kind: element.kind,
            position: None,
            content: Some(element.content),
            style: Some(element.style),
        })
        .collect();
    let detail = state
        .db
        .call(move |db| db.create_section_with_elements(user_id, page_id, &section, &elements))
        .await?;
    tracing::info!(
        user_id,
        page_id,
        section_id = detail.section.id,
        elements = detail.elements.len(),
        "generated section saved"
    );
    publish(
        &state.events,
        user_id,
        &StudioEvent::SectionChanged {
            section: detail.section.clone(),
        },
    );
    for element in &detail.elements {
        publish(
            &state.events,
            user_id,
            &StudioEvent::ElementChanged {
                element: element.clone(),
            },
        );
    }
    Ok(detail)
}
