use std::sync::Arc;

use sqlx::SqlitePool;

use crate::auth::token::JwtKeys;
use crate::config::Config;
use crate::mail::Mailer;
use crate::render::CvRenderClient;
use crate::storage::Storage;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    /// Pictures and attachments. Local disk or S3, chosen by STORAGE_BACKEND.
    pub storage: Arc<dyn Storage>,
    pub mailer: Arc<dyn Mailer>,
    /// Absent when CV_RENDER_URL is not configured.
    pub cv_renderer: Option<CvRenderClient>,
    pub jwt: JwtKeys,
    pub config: Config,
}
