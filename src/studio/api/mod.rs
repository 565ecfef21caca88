//! HTTP surface: shared state, error mapping, and the route table.

mod ai;
mod auth;
mod extract;
mod media;
mod public;
mod sites;
mod vcards;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};

use super::ai::ProviderRegistry;
use super::db::DbHandle;
use super::events::EventSender;
use super::storage::BlobStore;
use crate::config::AppConfig;
use crate::errors::StudioError;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub db: DbHandle,
    pub events: EventSender,
    pub blobs: Arc<dyn BlobStore>,
    pub ai: ProviderRegistry,
    pub config: AppConfig,
}

pub type SharedState = Arc<AppState>;

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Conflict(String),
    PayloadTooLarge(String),
    UnsupportedMediaType(String),
    BadGateway(String),
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::BadGateway(msg)
            | ApiError::Internal(msg) => msg,
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<&StudioError> for ApiError {
    fn from(err: &StudioError) -> Self {
        let msg = err.to_string();
        match err {
            StudioError::NotFound { .. } => ApiError::NotFound(msg),
            StudioError::SlugTaken { .. } | StudioError::EmailTaken { .. } => {
                ApiError::Conflict(msg)
            }
            StudioError::InvalidOrder(_)
            | StudioError::Validation(_)
            | StudioError::ProviderNotConfigured(_) => ApiError::BadRequest(msg),
            StudioError::InvalidCredentials | StudioError::Unauthorized => {
                ApiError::Unauthorized(msg)
            }
            StudioError::PayloadTooLarge { .. } => ApiError::PayloadTooLarge(msg),
            StudioError::UnsupportedMediaType(_) => ApiError::UnsupportedMediaType(msg),
            StudioError::Provider { .. } => ApiError::BadGateway(msg),
            StudioError::Other(inner) => internal(inner),
        }
    }
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        ApiError::from(&err)
    }
}

/// Domain errors raised inside `anyhow` keep their status; everything
/// else is a 500.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<StudioError>() {
            Some(studio) => ApiError::from(studio),
            None => internal(&err),
        }
    }
}

/// Context strings stay in the log; clients get a fixed message.
fn internal(err: &anyhow::Error) -> ApiError {
    tracing::error!(error = format!("{:#}", err), "request failed");
    ApiError::Internal(INTERNAL_MESSAGE.into())
}

const INTERNAL_MESSAGE: &str = "Internal server error";

// ── Router ────────────────────────────────────────────────────────────

/// All REST and public routes. `upload_limit` caps multipart bodies on the
/// media upload route.
pub fn api_router(upload_limit: usize) -> Router<SharedState> {
    // Room for multipart framing around the file itself.
    let body_limit = upload_limit.saturating_add(64 * 1024);

    Router::new()
        .route("/health", get(health_check))
        // Accounts
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        // Websites → pages → sections → elements
        .route(
            "/api/websites",
            get(sites::list_websites).post(sites::create_website),
        )
        .route(
            "/api/websites/{id}",
            get(sites::get_website)
                .patch(sites::update_website)
                .delete(sites::delete_website),
        )
        .route(
            "/api/websites/{id}/pages",
            get(sites::list_pages).post(sites::create_page),
        )
        .route("/api/websites/{id}/pages/reorder", post(sites::reorder_pages))
        .route(
            "/api/pages/{id}",
            get(sites::get_page)
                .patch(sites::update_page)
                .delete(sites::delete_page),
        )
        .route("/api/pages/{id}/duplicate", post(sites::duplicate_page))
        .route(
            "/api/pages/{id}/editor",
            get(sites::load_editor).put(sites::save_editor),
        )
        .route(
            "/api/pages/{id}/sections",
            get(sites::list_sections).post(sites::create_section),
        )
        .route(
            "/api/pages/{id}/sections/reorder",
            post(sites::reorder_sections),
        )
        .route(
            "/api/sections/{id}",
            get(sites::get_section)
                .patch(sites::update_section)
                .delete(sites::delete_section),
        )
        .route(
            "/api/sections/{id}/elements",
            get(sites::list_elements).post(sites::create_element),
        )
        .route(
            "/api/sections/{id}/elements/reorder",
            post(sites::reorder_elements),
        )
        .route(
            "/api/elements/{id}",
            get(sites::get_element)
                .patch(sites::update_element)
                .delete(sites::delete_element),
        )
        // Media
        .route(
            "/api/media",
            get(media::list_media)
                .post(media::upload_media)
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .route(
            "/api/media/{id}",
            get(media::get_media).delete(media::delete_media),
        )
        .route("/media/{id}", get(media::serve_media))
        // vCards
        .route(
            "/api/vcards",
            get(vcards::list_vcards).post(vcards::create_vcard),
        )
        .route(
            "/api/vcards/{id}",
            get(vcards::get_vcard)
                .patch(vcards::update_vcard)
                .delete(vcards::delete_vcard),
        )
        .route("/api/vcards/{id}/vcf", get(vcards::export_vcf))
        .route("/v/{slug}", get(vcards::public_profile))
        .route("/v/{slug}/contact.vcf", get(vcards::public_vcf))
        // Published sites
        .route("/s/{site_slug}", get(public::site_home))
        .route("/s/{site_slug}/{page_slug}", get(public::site_page))
        // AI
        .route("/api/ai/providers", get(ai::list_providers))
        .route("/api/ai/generate", post(ai::generate))
}

async fn health_check() -> &'static str {
    "ok"
}

// ── Test harness ──────────────────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_health_check() {
        let app = test_app();
        let response = app
            .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[test]
    fn test_studio_error_status_mapping() {
        let cases = [
            (StudioError::not_found(crate::errors::ResourceKind::Page, 1), StatusCode::NOT_FOUND),
            (StudioError::SlugTaken { slug: "a".into() }, StatusCode::CONFLICT),
            (StudioError::EmailTaken { email: "a".into() }, StatusCode::CONFLICT),
            (StudioError::InvalidOrder("x".into()), StatusCode::BAD_REQUEST),
            (StudioError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (StudioError::ProviderNotConfigured("x".into()), StatusCode::BAD_REQUEST),
            (StudioError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (StudioError::Unauthorized, StatusCode::UNAUTHORIZED),
            (StudioError::PayloadTooLarge { size: 2, limit: 1 }, StatusCode::PAYLOAD_TOO_LARGE),
            (StudioError::UnsupportedMediaType("x".into()), StatusCode::UNSUPPORTED_MEDIA_TYPE),
            (
                StudioError::Provider { provider: "p".into(), message: "m".into() },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_anyhow_downcast_keeps_status() {
        let err = anyhow::Error::from(StudioError::SlugTaken { slug: "x".into() })
            .context("Failed to create website");
        assert_eq!(ApiError::from(err).status(), StatusCode::CONFLICT);
        let plain = anyhow::anyhow!("disk on fire");
        assert_eq!(ApiError::from(plain).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_internal_error_hides_context() {
        let err = anyhow::anyhow!("no such table: pages").context("Failed to query page");
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let response = ApiError::NotFound("Page 1 not found".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_text(response).await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["error"], "Page 1 not found");
    }
}
