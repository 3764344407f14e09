use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use crate::attachments::store::{self, NewUpload};
use crate::auth::extractor::AuthUser;
use crate::errors::AppError;
use crate::events::store::find_event;
use crate::models::upload::Upload;
use crate::routes::extract::{Json, Path};
use crate::routes::upload::read_file_field;
use crate::state::AppState;
use crate::storage::sanitize_filename;

pub fn attachment_key(user_id: i64, filename: &str) -> String {
    format!(
        "attachments/{user_id}/{}-{}",
        Uuid::new_v4(),
        sanitize_filename(filename)
    )
}

/// POST /events/:id/attachments
pub async fn handle_upload_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<Upload>), AppError> {
    find_event(&state.db, auth.id, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))?;

    let file = read_file_field(&mut multipart, "file").await?;
    let key = attachment_key(auth.id, &file.filename);
    let size_bytes = file.data.len() as i64;

    state
        .storage
        .put(&key, file.data, &file.content_type)
        .await?;

    let upload = store::insert_upload(
        &state.db,
        NewUpload {
            filename: &file.filename,
            storage_key: &key,
            content_type: &file.content_type,
            size_bytes,
            user_id: auth.id,
            event_id: Some(event_id),
        },
    )
    .await;

    let upload = match upload {
        Ok(u) => u,
        Err(e) => {
            // Don't leave an orphaned object behind.
            if let Err(del) = state.storage.delete(&key).await {
                warn!("Could not remove orphaned upload {key}: {del}");
            }
            return Err(e.into());
        }
    };

    info!(
        "Stored attachment {} ({} bytes) on event {}",
        upload.id, size_bytes, event_id
    );
    Ok((StatusCode::CREATED, Json(upload)))
}

/// GET /events/:id/attachments
pub async fn handle_list_attachments(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(event_id): Path<i64>,
) -> Result<Json<Vec<Upload>>, AppError> {
    find_event(&state.db, auth.id, event_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Event {event_id} not found")))?;
    Ok(Json(store::list_for_event(&state.db, auth.id, event_id).await?))
}

/// GET /attachments/:id
pub async fn handle_download_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(upload_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let upload = store::find_upload(&state.db, auth.id, upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attachment {upload_id} not found")))?;

    let data = state.storage.get(&upload.storage_key).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        sanitize_filename(&upload.filename)
    );

    Ok((
        [
            (header::CONTENT_TYPE, upload.content_type),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        data,
    ))
}

/// DELETE /attachments/:id
pub async fn handle_delete_attachment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(upload_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let upload = store::find_upload(&state.db, auth.id, upload_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Attachment {upload_id} not found")))?;

    store::delete_upload(&state.db, auth.id, upload_id).await?;
    if let Err(e) = state.storage.delete(&upload.storage_key).await {
        warn!(
            "Could not remove stored file {} of deleted attachment {}: {e}",
            upload.storage_key, upload_id
        );
    }

    info!("User {} deleted attachment {}", auth.id, upload_id);
    Ok(StatusCode::NO_CONTENT)
}
