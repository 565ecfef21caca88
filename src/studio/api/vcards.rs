use axum::{
    extract::State,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};

use super::public::not_found_page;
use super::extract::{Json, Path};
use super::{ApiError, SharedState};
use crate::studio::auth::AuthUser;
use crate::studio::events::{StudioEvent, publish};
use crate::studio::models::{NewVCard, VCard, VCardPatch};
use crate::studio::vcard::{attachment_header, render_profile_html, render_vcf};

pub async fn list_vcards(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let cards = state.db.call(move |db| db.list_vcards(user_id)).await?;
    Ok(Json(cards))
}

pub async fn create_vcard(
    State(state): State<SharedState>,
    user: AuthUser,
    Json(req): Json<NewVCard>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let card = state
        .db
        .call(move |db| db.create_vcard(user_id, &req))
        .await?;
    tracing::info!(user_id, vcard_id = card.id, slug = %card.slug, "vcard created");
    changed(&state, user_id, card.id, false);
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn get_vcard(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let card = state.db.call(move |db| db.get_vcard(user_id, id)).await?;
    Ok(Json(card))
}

pub async fn update_vcard(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<VCardPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let card = state
        .db
        .call(move |db| db.update_vcard(user_id, id, &req))
        .await?;
    tracing::info!(user_id, vcard_id = id, published = card.published, "vcard updated");
    changed(&state, user_id, id, false);
    Ok(Json(card))
}

pub async fn delete_vcard(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    state.db.call(move |db| db.delete_vcard(user_id, id)).await?;
    tracing::info!(user_id, vcard_id = id, "vcard deleted");
    changed(&state, user_id, id, true);
    Ok(StatusCode::NO_CONTENT)
}

/// Owner download, published or not.
pub async fn export_vcf(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Response, ApiError> {
    let user_id = user.id;
    let card = state.db.call(move |db| db.get_vcard(user_id, id)).await?;
    Ok(vcf_response(&state, card))
}

pub async fn public_profile(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let card = state
        .db
        .call(move |db| {
            let card = db.find_published_vcard(&slug)?;
            if let Some(card) = &card {
                db.record_vcard_view(card.id)?;
            }
            Ok(card)
        })
        .await?;
    Ok(match card {
        Some(card) => {
            tracing::debug!(vcard_id = card.id, "vcard profile viewed");
            Html(render_profile_html(&card)).into_response()
        }
        None => not_found_page("Card not found"),
    })
}

pub async fn public_vcf(
    State(state): State<SharedState>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let card = state
        .db
        .call(move |db| db.find_published_vcard(&slug))
        .await?;
    Ok(match card {
        Some(card) => vcf_response(&state, card),
        None => not_found_page("Card not found"),
    })
}

/// Contacts apps need absolute URLs, so uploaded avatars (`/media/{id}`)
/// are prefixed with the public base URL.
fn vcf_response(state: &SharedState, mut card: VCard) -> Response {
    if card.avatar_url.starts_with('/') {
        card.avatar_url = format!("{}{}", state.config.public_url(), card.avatar_url);
    }
    (
        [
            (header::CONTENT_TYPE, "text/vcard; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, attachment_header(&card)),
        ],
        render_vcf(&card),
    )
        .into_response()
}

fn changed(state: &SharedState, user_id: i64, vcard_id: i64, deleted: bool) {
    publish(
        &state.events,
        user_id,
        &StudioEvent::VCardChanged { vcard_id, deleted },
    );
}
