mod attachments;
mod auth;
mod config;
mod cv;
mod db;
mod errors;
mod events;
mod history;
mod mail;
mod models;
mod render;
mod routes;
mod state;
mod storage;
mod users;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::auth::token::JwtKeys;
use crate::config::{Config, StorageBackend};
use crate::db::create_pool;
use crate::mail::{HttpMailer, LogMailer, Mailer};
use crate::render::CvRenderClient;
use crate::routes::build_router;
use crate::state::AppState;
use crate::storage::{LocalStorage, S3Storage, Storage};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={},tower_http={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log,
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Here I Am API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize SQLite and apply migrations
    let db = create_pool(&config.database_url).await?;

    let storage: Arc<dyn Storage> = match &config.storage {
        StorageBackend::Local { root } => {
            tokio::fs::create_dir_all(root).await?;
            info!("Local storage at {root}");
            Arc::new(LocalStorage::new(root))
        }
        StorageBackend::S3(s3) => Arc::new(S3Storage::connect(s3).await),
    };

    let mailer: Arc<dyn Mailer> = match config.mail.clone() {
        Some(mail) => {
            info!("Mail delivery via {}", mail.api_url);
            Arc::new(HttpMailer::new(mail, config.mail_from.clone())?)
        }
        None => {
            warn!("MAIL_API_URL not set; outgoing mail will only be logged");
            Arc::new(LogMailer::new())
        }
    };

    let cv_renderer = match config.cv_render_url.clone() {
        Some(url) => {
            info!("CV renderer at {url}");
            Some(CvRenderClient::new(url)?)
        }
        None => {
            warn!("CV_RENDER_URL not set; /generate-cv will answer 501");
            None
        }
    };

    let jwt = JwtKeys::new(config.jwt_secret.as_bytes(), config.token_ttl_hours);

    // Build app state
    let state = AppState {
        db,
        storage,
        mailer,
        cv_renderer,
        jwt,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
