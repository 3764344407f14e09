use sqlx::SqlitePool;

use crate::models::upload::Upload;

pub struct NewUpload<'a> {
    pub filename: &'a str,
    pub storage_key: &'a str,
    pub content_type: &'a str,
    pub size_bytes: i64,
    pub user_id: i64,
    pub event_id: Option<i64>,
}

pub async fn insert_upload(pool: &SqlitePool, upload: NewUpload<'_>) -> Result<Upload, sqlx::Error> {
    sqlx::query_as::<_, Upload>(
        r#"
        INSERT INTO uploads (filename, storage_key, content_type, size_bytes, user_id, event_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(upload.filename)
    .bind(upload.storage_key)
    .bind(upload.content_type)
    .bind(upload.size_bytes)
    .bind(upload.user_id)
    .bind(upload.event_id)
    .fetch_one(pool)
    .await
}

pub async fn list_for_event(
    pool: &SqlitePool,
    user_id: i64,
    event_id: i64,
) -> Result<Vec<Upload>, sqlx::Error> {
    sqlx::query_as::<_, Upload>(
        "SELECT * FROM uploads WHERE event_id = $1 AND user_id = $2 ORDER BY id",
    )
    .bind(event_id)
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn find_upload(
    pool: &SqlitePool,
    user_id: i64,
    upload_id: i64,
) -> Result<Option<Upload>, sqlx::Error> {
    sqlx::query_as::<_, Upload>("SELECT * FROM uploads WHERE id = $1 AND user_id = $2")
        .bind(upload_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

pub async fn delete_upload(
    pool: &SqlitePool,
    user_id: i64,
    upload_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM uploads WHERE id = $1 AND user_id = $2")
        .bind(upload_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
