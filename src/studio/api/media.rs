use axum::{
    extract::{Multipart, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
};

use super::extract::{Json, Path};
use super::{ApiError, SharedState};
use crate::errors::StudioError;
use crate::studio::auth::AuthUser;
use crate::studio::events::{StudioEvent, publish};
use crate::studio::models::MediaView;
use crate::studio::storage::new_blob_key;

const UPLOAD_FIELD: &str = "file";

/// Content type for an upload: the part header unless it is missing or
/// generic, otherwise a guess from the filename. Parameters are dropped.
pub fn resolve_content_type(header: Option<&str>, filename: &str) -> String {
    let declared = header
        .map(|ct| ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
    declared.unwrap_or_else(|| {
        mime_guess::from_path(filename)
            .first_or_octet_stream()
            .essence_str()
            .to_string()
    })
}

fn multipart_error(err: MultipartError, limit: usize) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        StudioError::PayloadTooLarge {
            size: limit.saturating_add(1),
            limit,
        }
        .into()
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

pub async fn upload_media(
    State(state): State<SharedState>,
    user: AuthUser,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let limit = state.config.storage.max_upload_bytes;
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field
            .file_name()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = resolve_content_type(field.content_type(), &filename);
        let bytes = field.bytes().await.map_err(|e| multipart_error(e, limit))?;
        upload = Some((filename, content_type, bytes));
        break;
    }
    let Some((filename, content_type, bytes)) = upload else {
        return Err(ApiError::BadRequest(format!(
            "Multipart field '{}' is required",
            UPLOAD_FIELD
        )));
    };

    if !state
        .config
        .storage
        .allowed_types
        .iter()
        .any(|t| t.eq_ignore_ascii_case(&content_type))
    {
        return Err(StudioError::UnsupportedMediaType(content_type).into());
    }
    if bytes.len() > limit {
        return Err(StudioError::PayloadTooLarge {
            size: bytes.len(),
            limit,
        }
        .into());
    }

    let user_id = user.id;
    let key = new_blob_key(user_id, &filename, &content_type);
    state.blobs.put(&key, &bytes).await?;

    let size = bytes.len() as i64;
    let row_key = key.clone();
    let created = state
        .db
        .call(move |db| db.create_media(user_id, &filename, &row_key, &content_type, size))
        .await;
    let asset = match created {
        Ok(asset) => asset,
        Err(e) => {
            if let Err(cleanup) = state.blobs.delete(&key).await {
                tracing::warn!(key = %key, error = %cleanup, "failed to remove orphaned blob");
            }
            return Err(e.into());
        }
    };
    tracing::info!(user_id, media_id = asset.id, size, content_type = %asset.content_type, "media uploaded");
    publish(
        &state.events,
        user_id,
        &StudioEvent::MediaChanged {
            media_id: asset.id,
            deleted: false,
        },
    );
    Ok((StatusCode::CREATED, Json(MediaView::from(asset))))
}

pub async fn list_media(
    State(state): State<SharedState>,
    user: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let assets = state.db.call(move |db| db.list_media(user_id)).await?;
    let views: Vec<MediaView> = assets.into_iter().map(MediaView::from).collect();
    Ok(Json(views))
}

pub async fn get_media(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let asset = state.db.call(move |db| db.get_media(user_id, id)).await?;
    Ok(Json(MediaView::from(asset)))
}

pub async fn delete_media(
    State(state): State<SharedState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = user.id;
    let asset = state.db.call(move |db| db.delete_media(user_id, id)).await?;
    if let Err(e) = state.blobs.delete(&asset.storage_key).await {
        tracing::warn!(media_id = id, key = %asset.storage_key, error = %e, "blob delete failed");
    }
    tracing::info!(user_id, media_id = id, "media deleted");
    publish(
        &state.events,
        user_id,
        &StudioEvent::MediaChanged {
            media_id: id,
            deleted: true,
        },
    );
    Ok(StatusCode::NO_CONTENT)
}

/// Uploads share the app's origin; scripts inside SVG or HTML must not run.
const MEDIA_CSP: &str = "default-src 'none'; style-src 'unsafe-inline'; sandbox";

/// Public, unauthenticated blob download.
pub async fn serve_media(
    State(state): State<SharedState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let asset = state
        .db
        .call(move |db| db.find_media(id))
        .await?
        .ok_or_else(|| StudioError::not_found(crate::errors::ResourceKind::Media, id))?;
    let Some(bytes) = state.blobs.get(&asset.storage_key).await? else {
        tracing::warn!(media_id = id, key = %asset.storage_key, "media row has no blob");
        return Err(StudioError::not_found(crate::errors::ResourceKind::Media, id).into());
    };
    Ok((
        [
            (header::CONTENT_TYPE, asset.content_type),
            (
                header::CACHE_CONTROL,
                "public, max-age=31536000, immutable".to_string(),
            ),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()),
            (header::CONTENT_SECURITY_POLICY, MEDIA_CSP.to_string()),
        ],
        bytes,
    ))
}
