use std::collections::HashMap;

use axum::{extract::State, http::StatusCode};
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::{info, warn};

use crate::attachments::store as attachment_store;
use crate::auth::extractor::AuthUser;
use crate::errors::AppError;
use crate::events::calendar::{grid_bounds, month_grid, parse_date, parse_time, CalendarCell};
use crate::events::store::{self, EventFields};
use crate::models::event::{Event, Importance};
use crate::routes::extract::{Json, Path, Query};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub importance: Option<String>,
}

/// Partial update. `date` and `time` may change independently.
#[derive(Debug, Deserialize)]
pub struct UpdateEventRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub time: Option<String>,
    pub importance: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DayQuery {
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct MonthQuery {
    pub year: i32,
    pub month: u32,
}

fn parse_importance(value: Option<&str>) -> Result<Option<Importance>, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.parse::<Importance>())
        .transpose()
        .map_err(AppError::Validation)
}

/// Empty or missing time means the start of the day.
fn parse_optional_time(value: Option<&str>) -> Result<Option<NaiveTime>, AppError> {
    value
        .filter(|v| !v.trim().is_empty())
        .map(parse_time)
        .transpose()
        .map_err(AppError::Validation)
}

fn scheduled(date: NaiveDate, time: NaiveTime) -> (chrono::NaiveDateTime, chrono::NaiveDateTime) {
    let start = date.and_time(time);
    // Events carry no duration yet; they end where they start.
    (start, start)
}

/// POST /events
pub async fn handle_create_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let title = req.title.as_deref().map(str::trim).unwrap_or_default();
    let date = req.date.as_deref().map(str::trim).unwrap_or_default();
    if title.is_empty() || date.is_empty() {
        return Err(AppError::Validation(
            "title and date are required".to_string(),
        ));
    }

    let date = parse_date(date).map_err(AppError::Validation)?;
    let time = parse_optional_time(req.time.as_deref())?.unwrap_or(NaiveTime::MIN);
    let (start_time, end_time) = scheduled(date, time);

    let fields = EventFields {
        title: title.to_string(),
        description: req.description.as_deref().map(str::trim).unwrap_or_default().to_string(),
        start_time,
        end_time,
        importance: parse_importance(req.importance.as_deref())?.unwrap_or_default(),
    };

    let event = store::insert_event(&state.db, auth.id, &fields).await?;
    info!("User {} created event {} on {}", auth.id, event.id, date);

    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /events?date=YYYY-MM-DD
pub async fn handle_list_day(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<DayQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let date = query
        .date
        .filter(|d| !d.trim().is_empty())
        .ok_or_else(|| AppError::Validation("missing date parameter".to_string()))?;
    let day = parse_date(&date).map_err(AppError::Validation)?;

    Ok(Json(store::list_for_day(&state.db, auth.id, day).await?))
}

/// GET /events/month?year=&month=
pub async fn handle_month(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MonthQuery>,
) -> Result<Json<Vec<CalendarCell>>, AppError> {
    let (from, to) = grid_bounds(query.year, query.month).ok_or_else(|| {
        AppError::Validation(format!("invalid month {}-{}", query.year, query.month))
    })?;

    let events = store::list_between(&state.db, auth.id, from, to).await?;
    let mut counts: HashMap<NaiveDate, usize> = HashMap::new();
    for event in &events {
        *counts.entry(event.date()).or_default() += 1;
    }

    let grid = month_grid(query.year, query.month, &counts).ok_or_else(|| {
        AppError::Validation(format!("invalid month {}-{}", query.year, query.month))
    })?;
    Ok(Json(grid))
}

/// GET /events/:id
pub async fn handle_get_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Event>, AppError> {
    store::find_event(&state.db, auth.id, event_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))
}

/// PUT /events/:id
pub async fn handle_update_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<i64>,
    Json(req): Json<UpdateEventRequest>,
) -> Result<Json<Event>, AppError> {
    let existing = store::find_event(&state.db, auth.id, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))?;

    let title = match req.title.as_deref().map(str::trim) {
        Some("") => return Err(AppError::Validation("title cannot be empty".to_string())),
        Some(t) => t.to_string(),
        None => existing.title.clone(),
    };

    let date = match req.date.as_deref() {
        Some(d) => parse_date(d).map_err(AppError::Validation)?,
        None => existing.date(),
    };
    let time = match req.time.as_deref() {
        Some(t) => parse_optional_time(Some(t))?.unwrap_or(NaiveTime::MIN),
        None => existing.start_time.time(),
    };
    let (start_time, end_time) = scheduled(date, time);

    let fields = EventFields {
        title,
        description: req
            .description
            .map(|d| d.trim().to_string())
            .unwrap_or(existing.description),
        start_time,
        end_time,
        importance: parse_importance(req.importance.as_deref())?.unwrap_or(existing.importance),
    };

    let event = store::update_event(&state.db, auth.id, event_id, &fields)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))?;
    info!("User {} updated event {}", auth.id, event_id);
    Ok(Json(event))
}

/// DELETE /events/:id
///
/// Removes the event, its attachment rows, and their stored files.
pub async fn handle_delete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let attachments = attachment_store::list_for_event(&state.db, auth.id, event_id).await?;

    if !store::delete_event(&state.db, auth.id, event_id).await? {
        return Err(AppError::NotFound(format!("Event {event_id} not found")));
    }

    for attachment in attachments {
        if let Err(e) = state.storage.delete(&attachment.storage_key).await {
            warn!(
                "Could not remove stored file {} of deleted event {}: {e}",
                attachment.storage_key, event_id
            );
        }
    }

    info!("User {} deleted event {}", auth.id, event_id);
    Ok(StatusCode::NO_CONTENT)
}
