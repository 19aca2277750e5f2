mod auth;
mod config;
mod db;
mod error;
mod events;
mod items;
mod routes;
mod shares;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};
use crate::events::EventHub;
use crate::items::{SqliteItemRepository, StorageTier};
use crate::shares::{ShareManager, SqliteShareLinkRepository};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;
    if config.auth.password.is_none() {
        tracing::warn!("no access password configured; the API is open");
    }

    // Ensure uploads directory exists
    std::fs::create_dir_all(config.uploads_path())?;

    // Initialize database
    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    // Wire up the core: repositories, storage tier, share manager, event hub
    let item_repo = Arc::new(SqliteItemRepository::new(pool.clone()));
    let storage = Arc::new(StorageTier::new(
        item_repo.clone(),
        config.uploads_path().clone(),
        config.storage.inline_threshold,
        config.storage.max_upload_size,
    ));
    let share_repo = Arc::new(SqliteShareLinkRepository::new(pool.clone()));
    let shares = Arc::new(ShareManager::new(share_repo, storage.clone()));
    let hub = Arc::new(EventHub::new());

    let state = AppState {
        db: pool,
        config: config.clone(),
        items: item_repo,
        storage,
        shares,
        hub,
    };

    // Gated surface: item CRUD, share management, the event stream
    let protected = Router::new()
        .merge(routes::items::router())
        .merge(routes::shares::router())
        .merge(routes::events::router())
        .layer(DefaultBodyLimit::max(
            (config.storage.max_upload_size + 10 * 1024 * 1024) as usize,
        ))
        .layer(from_fn_with_state(state.clone(), auth::require_password));

    // Open surface: health, the password gate itself, recipient share access
    let public = Router::new()
        .route("/health", get(health))
        .merge(auth::router())
        .merge(routes::shares::public_router());

    let app = Router::new()
        .nest("/api", protected.merge(public))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors(&config));

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

fn build_cors(config: &Config) -> CorsLayer {
    let methods = [
        Method::GET,
        Method::POST,
        Method::DELETE,
        Method::PUT,
        Method::OPTIONS,
    ];
    let headers = [header::ACCEPT, header::CONTENT_TYPE, header::AUTHORIZATION];

    if config.server.cors_origins.is_empty() {
        // Same-origin deployment; stay permissive but without credentials
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .server
            .cors_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s.trim()).ok())
            .collect();
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_origin(origins)
            .allow_credentials(true)
    }
}
