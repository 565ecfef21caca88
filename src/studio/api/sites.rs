//! Websites, pages, sections, elements, and the editor document endpoints.
//!
//! Every handler passes the caller's id down to the db layer, which walks
//! the ownership chain and answers 404 for anything the caller does not own.

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use super::extract::{Json, Path};
use super::{ApiError, SharedState};
use crate::studio::auth::AuthUser;
use crate::studio::events::{StudioEvent, publish};
use crate::studio::models::*;

// ── Websites ──────────────────────────────────────────────────────────

pub async fn list_websites(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let websites = state.db.call(move |db| db.list_websites(user_id)).await?;
    Ok(Json(websites))
}

pub async fn create_website(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(req): Json<NewWebsite>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let detail = state
        .db
        .call(move |db| {
            let website = db.create_website(user_id, &req)?;
            db.get_website_detail(user_id, website.id)
        })
        .await?;
    tracing::info!(user_id, website_id = detail.website.id, slug = %detail.website.slug, "website created");
    publish(
        &state.events,
        user_id,
        &StudioEvent::WebsiteChanged {
            website: detail.website.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(detail)))
}

pub async fn get_website(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let detail = state
        .db
        .call(move |db| db.get_website_detail(user_id, id))
        .await?;
    Ok(Json(detail))
}

pub async fn update_website(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<WebsitePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let website = state
        .db
        .call(move |db| db.update_website(user_id, id, &req))
        .await?;
    tracing::info!(user_id, website_id = id, published = website.published, "website updated");
    publish(
        &state.events,
        user_id,
        &StudioEvent::WebsiteChanged {
            website: website.clone(),
        },
    );
    Ok(Json(website))
}

pub async fn delete_website(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    state
        .db
        .call(move |db| db.delete_website(user_id, id))
        .await?;
    tracing::info!(user_id, website_id = id, "website deleted");
    publish(
        &state.events,
        user_id,
        &StudioEvent::WebsiteDeleted { website_id: id },
    );
    Ok(StatusCode::NO_CONTENT)
}

// ── Pages ─────────────────────────────────────────────────────────────

pub async fn list_pages(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(website_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let pages = state
        .db
        .call(move |db| db.list_pages(user_id, website_id))
        .await?;
    Ok(Json(pages))
}

pub async fn create_page(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(website_id): Path<i64>,
    Json(req): Json<NewPage>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state
        .db
        .call(move |db| db.create_page(user_id, website_id, &req))
        .await?;
    tracing::info!(user_id, website_id, page_id = page.id, "page created");
    page_changed(&state, user_id, &page);
    Ok((StatusCode::CREATED, Json(page)))
}

pub async fn reorder_pages(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(website_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let pages = state
        .db
        .call(move |db| db.reorder_pages(user_id, website_id, &req.ids))
        .await?;
    for page in &pages {
        publish(
            &state.events,
            user_id,
            &StudioEvent::PageChanged { page: page.clone() },
        );
    }
    Ok(Json(pages))
}

pub async fn get_page(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state.db.call(move |db| db.owned_page(user_id, id)).await?;
    Ok(Json(page))
}

pub async fn update_page(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<PagePatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state
        .db
        .call(move |db| db.update_page(user_id, id, &req))
        .await?;
    tracing::info!(user_id, page_id = id, "page updated");
    page_changed(&state, user_id, &page);
    Ok(Json(page))
}

pub async fn delete_page(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state.db.call(move |db| db.delete_page(user_id, id)).await?;
    tracing::info!(user_id, page_id = id, website_id = page.website_id, "page deleted");
    publish(
        &state.events,
        user_id,
        &StudioEvent::PageDeleted {
            website_id: page.website_id,
            page_id: id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

pub async fn duplicate_page(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state
        .db
        .call(move |db| db.duplicate_page(user_id, id))
        .await?;
    tracing::info!(user_id, source_page_id = id, page_id = page.id, "page duplicated");
    page_changed(&state, user_id, &page);
    Ok((StatusCode::CREATED, Json(page)))
}

pub async fn load_editor(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state.db.call(move |db| db.owned_page(user_id, id)).await?;
    Ok(Json(EditorDocument {
        html: page.html,
        css: page.css,
        project_data: page.project_data,
    }))
}

pub async fn save_editor(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(doc): Json<EditorDocument>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let page = state
        .db
        .call(move |db| db.save_editor_document(user_id, id, &doc))
        .await?;
    tracing::info!(user_id, page_id = id, html_bytes = page.html.len(), "editor document saved");
    page_changed(&state, user_id, &page);
    Ok(Json(EditorDocument {
        html: page.html,
        css: page.css,
        project_data: page.project_data,
    }))
}

fn page_changed(state: &SharedState, user_id: i64, page: &Page) {
    publish(
        &state.events,
        user_id,
        &StudioEvent::PageChanged {
            page: PageSummary::from(page),
        },
    );
}

// ── Sections ──────────────────────────────────────────────────────────

pub async fn list_sections(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(page_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let sections = state
        .db
        .call(move |db| db.list_sections(user_id, page_id))
        .await?;
    Ok(Json(sections))
}

pub async fn create_section(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(page_id): Path<i64>,
    Json(req): Json<NewSection>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let section = state
        .db
        .call(move |db| db.create_section(user_id, page_id, &req))
        .await?;
    tracing::info!(user_id, page_id, section_id = section.id, kind = %section.kind, "section created");
    publish(
        &state.events,
        user_id,
        &StudioEvent::SectionChanged {
            section: section.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(section)))
}

pub async fn reorder_sections(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(page_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let sections = state
        .db
        .call(move |db| db.reorder_sections(user_id, page_id, &req.ids))
        .await?;
    for section in &sections {
        publish(
            &state.events,
            user_id,
            &StudioEvent::SectionChanged {
                section: section.clone(),
            },
        );
    }
    Ok(Json(sections))
}

pub async fn get_section(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let detail = state
        .db
        .call(move |db| db.get_section_detail(user_id, id))
        .await?;
    Ok(Json(detail))
}

pub async fn update_section(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<SectionPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let section = state
        .db
        .call(move |db| db.update_section(user_id, id, &req))
        .await?;
    tracing::info!(user_id, section_id = id, "section updated");
    publish(
        &state.events,
        user_id,
        &StudioEvent::SectionChanged {
            section: section.clone(),
        },
    );
    Ok(Json(section))
}

pub async fn delete_section(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let section = state
        .db
        .call(move |db| db.delete_section(user_id, id))
        .await?;
    tracing::info!(user_id, section_id = id, page_id = section.page_id, "section deleted");
    publish(
        &state.events,
        user_id,
        &StudioEvent::SectionDeleted {
            page_id: section.page_id,
            section_id: id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

// ── Elements ──────────────────────────────────────────────────────────

pub async fn list_elements(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(section_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let elements = state
        .db
        .call(move |db| db.list_elements(user_id, section_id))
        .await?;
    Ok(Json(elements))
}

pub async fn create_element(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(section_id): Path<i64>,
    Json(req): Json<NewElement>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let element = state
        .db
        .call(move |db| db.create_element(user_id, section_id, &req))
        .await?;
    tracing::info!(user_id, section_id, element_id = element.id, kind = %element.kind, "element created");
    publish(
        &state.events,
        user_id,
        &StudioEvent::ElementChanged {
            element: element.clone(),
        },
    );
    Ok((StatusCode::CREATED, Json(element)))
}

pub async fn reorder_elements(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(section_id): Path<i64>,
    Json(req): Json<ReorderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let elements = state
        .db
        .call(move |db| db.reorder_elements(user_id, section_id, &req.ids))
        .await?;
    for element in &elements {
        publish(
            &state.events,
            user_id,
            &StudioEvent::ElementChanged {
                element: element.clone(),
            },
        );
    }
    Ok(Json(elements))
}

pub async fn get_element(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let element = state
        .db
        .call(move |db| db.owned_element(user_id, id))
        .await?;
    Ok(Json(element))
}

pub async fn update_element(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<ElementPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let element = state
        .db
        .call(move |db| db.update_element(user_id, id, &req))
        .await?;
    tracing::info!(user_id, element_id = id, section_id = element.section_id, "element updated");
    publish(
        &state.events,
        user_id,
        &StudioEvent::ElementChanged {
            element: element.clone(),
        },
    );
    Ok(Json(element))
}

pub async fn delete_element(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let element = state
        .db
        .call(move |db| db.delete_element(user_id, id))
        .await?;
    tracing::info!(user_id, element_id = id, "element deleted");
    publish(
        &state.events,
        user_id,
        &StudioEvent::ElementDeleted {
            section_id: element.section_id,
            element_id: id,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}
