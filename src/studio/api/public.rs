//! Published websites, served as server-rendered HTML.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};

use super::{ApiError, SharedState};
use crate::studio::render::render_page;
use crate::util::escape_html;

pub async fn site_home(
    State(state): State<SharedState>,
    Path(site_slug): Path<String>,
) -> Result<Response, ApiError> {
    serve(state, site_slug, None).await
}

pub async fn site_page(
    State(state): State<SharedState>,
    Path((site_slug, page_slug)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    serve(state, site_slug, Some(page_slug)).await
}

async fn serve(
    state: SharedState,
    site_slug: String,
    page_slug: Option<String>,
) -> Result<Response, ApiError> {
    let tree = state
        .db
        .call(move |db| db.published_page_tree(&site_slug, page_slug.as_deref()))
        .await?;
    Ok(match tree {
        Some(tree) => {
            tracing::debug!(website_id = tree.website.id, page_id = tree.page.id, "published page served");
            Html(render_page(&tree)).into_response()
        }
        None => not_found_page("Page not found"),
    })
}

/// Minimal HTML 404 for public routes.
pub(super) fn not_found_page(message: &str) -> Response {
    let message = escape_html(message);
    (
        StatusCode::NOT_FOUND,
        Html(format!(
            "<!doctype html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{0}</title></head>\n\
             <body><h1>{0}</h1></body>\n</html>\n",
            message
        )),
    )
        .into_response()
}
