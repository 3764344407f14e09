use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// A stored file: an event attachment, or a CV picture when `event_id` is null.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Upload {
    pub id: i64,
    pub filename: String,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub user_id: i64,
    pub event_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
