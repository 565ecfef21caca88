use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    body::Body,
    extract::Request,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;

use super::ai::ProviderRegistry;
use super::api::{self, AppState, SharedState};
use super::db::{DbHandle, StudioDb};
use super::embedded::Assets;
use super::events::{self, EventEnvelope};
use super::storage::LocalBlobStore;
use crate::config::AppConfig;

/// Capacity of the live-update channel. Slow sockets skip missed events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Runtime switches that come from the command line rather than config.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServeOptions {
    /// Open the editor in the default browser once the listener is bound.
    pub open_browser: bool,
}

/// Build the full application router with API, WebSocket, and editor shell.
pub fn build_router(state: SharedState) -> Router {
    let upload_limit = state.config.storage.max_upload_bytes;
    let mut app = api::api_router(upload_limit)
        .route("/ws", get(events::ws_handler))
        .fallback(static_handler)
        .with_state(state.clone());
    if state.config.server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Serve embedded static files or fall back to index.html for client-side routes.
async fn static_handler(req: Request<Body>) -> Response {
    let path = req.uri().path().trim_start_matches('/');

    // Unknown API paths stay JSON 404s instead of rendering the shell.
    if path.starts_with("api/") {
        return api::ApiError::NotFound(format!("No route for /{}", path)).into_response();
    }

    if !path.is_empty()
        && let Some(content) = Assets::get(path)
    {
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        return (
            [(header::CONTENT_TYPE, mime.as_ref().to_string())],
            content.data.to_vec(),
        )
            .into_response();
    }

    match Assets::get("index.html") {
        Some(content) => Html(String::from_utf8_lossy(&content.data).to_string()).into_response(),
        None => (StatusCode::NOT_FOUND, "Editor shell not found in ui/dist.").into_response(),
    }
}

/// Open the database, blob store, and provider registry described by `config`.
pub fn build_state(config: AppConfig) -> Result<SharedState> {
    if let Some(parent) = config.database.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    let db = StudioDb::new(&config.database.path).context("Failed to initialize database")?;
    let purged = db.purge_expired_sessions()?;
    if purged > 0 {
        tracing::info!(purged, "expired sessions removed");
    }
    let blobs = LocalBlobStore::new(&config.storage.root).context("Failed to initialize blob storage")?;
    let ai = ProviderRegistry::from_settings(&config.ai, |key| std::env::var(key).ok())
        .context("Failed to configure AI providers")?;
    if ai.is_empty() {
        tracing::warn!("no AI provider has an API key; generation endpoints will return 400");
    }
    let (events, _rx) = broadcast::channel::<EventEnvelope>(EVENT_CHANNEL_CAPACITY);

    Ok(Arc::new(AppState {
        db: DbHandle::new(db),
        events,
        blobs: Arc::new(blobs),
        ai,
        config,
    }))
}

/// Start the HTTP server and block until Ctrl+C.
pub async fn start_server(config: AppConfig, options: ServeOptions) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = build_state(config)?;
    let app = build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    let local_addr = listener.local_addr()?;
    let url = format!("http://{}", local_addr);
    tracing::info!(
        %local_addr,
        db = %state.config.database.path.display(),
        providers = state.ai.list().len(),
        dev_mode = state.config.server.dev_mode,
        "sitecraft listening"
    );
    println!("Sitecraft running at {}", url);
    if state.config.server.public_url.is_some() {
        println!("Public URL: {}", state.config.public_url());
    }

    if options.open_browser
        && let Err(e) = open::that(&url)
    {
        tracing::warn!(error = %e, "failed to open browser");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
