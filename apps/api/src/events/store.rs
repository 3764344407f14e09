use chrono::{NaiveDate, NaiveDateTime};
use sqlx::SqlitePool;

use crate::events::calendar::start_of_day;
use crate::models::event::{Event, Importance};

/// Event fields as written to the database. Used for inserts and full updates.
#[derive(Debug, Clone)]
pub struct EventFields {
    pub title: String,
    pub description: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub importance: Importance,
}

pub async fn insert_event(
    pool: &SqlitePool,
    user_id: i64,
    fields: &EventFields,
) -> Result<Event, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        r#"
        INSERT INTO events (user_id, title, description, start_time, end_time, importance)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.importance)
    .fetch_one(pool)
    .await
}

/// Events owned by `user_id` are visible; anyone else's are reported missing.
pub async fn find_event(
    pool: &SqlitePool,
    user_id: i64,
    event_id: i64,
) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1 AND user_id = $2")
        .bind(event_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
}

/// Events starting in `[from, to)`, earliest first.
pub async fn list_between(
    pool: &SqlitePool,
    user_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        r#"
        SELECT * FROM events
        WHERE user_id = $1 AND start_time >= $2 AND start_time < $3
        ORDER BY start_time, id
        "#,
    )
    .bind(user_id)
    .bind(start_of_day(from))
    .bind(start_of_day(to))
    .fetch_all(pool)
    .await
}

pub async fn list_for_day(
    pool: &SqlitePool,
    user_id: i64,
    day: NaiveDate,
) -> Result<Vec<Event>, sqlx::Error> {
    let next = day.succ_opt().unwrap_or(NaiveDate::MAX);
    list_between(pool, user_id, day, next).await
}

/// Every event of a user, newest first.
pub async fn list_for_user(pool: &SqlitePool, user_id: i64) -> Result<Vec<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        "SELECT * FROM events WHERE user_id = $1 ORDER BY start_time DESC, id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn update_event(
    pool: &SqlitePool,
    user_id: i64,
    event_id: i64,
    fields: &EventFields,
) -> Result<Option<Event>, sqlx::Error> {
    sqlx::query_as::<_, Event>(
        r#"
        UPDATE events
        SET title = $1, description = $2, start_time = $3, end_time = $4, importance = $5
        WHERE id = $6 AND user_id = $7
        RETURNING *
        "#,
    )
    .bind(&fields.title)
    .bind(&fields.description)
    .bind(fields.start_time)
    .bind(fields.end_time)
    .bind(fields.importance)
    .bind(event_id)
    .bind(user_id)
    .fetch_optional(pool)
    .await
}

/// Returns whether a row was deleted. Attachment rows go with it (cascade).
pub async fn delete_event(
    pool: &SqlitePool,
    user_id: i64,
    event_id: i64,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM events WHERE id = $1 AND user_id = $2")
        .bind(event_id)
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
