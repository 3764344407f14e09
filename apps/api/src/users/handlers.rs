use axum::{
    extract::{Multipart, State},
    http::header,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::auth::extractor::AuthUser;
use crate::auth::password::{hash_password, verify_password};
use crate::cv::validation::validate_email;
use crate::errors::{is_unique_violation, AppError};
use crate::models::user::User;
use crate::routes::extract::{Json, Path};
use crate::routes::upload::read_file_field;
use crate::state::AppState;
use crate::storage::extension_of;
use crate::users::store::{self, ProfileChanges};

const PICTURE_PREFIX: &str = "pictures";
const PICTURE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub profile_picture: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CheckPasswordRequest {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct CheckPasswordResponse {
    pub valid: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePasswordRequest {
    #[serde(rename = "newPassword")]
    pub new_password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UpdatePasswordResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct ProfilePictureResponse {
    pub profile_picture: String,
}

async fn load_user(state: &AppState, user_id: i64) -> Result<User, AppError> {
    store::find_by_id(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

/// Whether `name` is one of the picture names `user_id` can own: `user_{id}.{ext}`.
pub fn owns_picture(user_id: i64, name: &str) -> bool {
    name.strip_prefix(&format!("user_{user_id}."))
        .is_some_and(|ext| PICTURE_EXTENSIONS.contains(&ext))
}

fn required_text(value: Option<String>, field: &str) -> Result<Option<String>, AppError> {
    match value {
        None => Ok(None),
        Some(v) if v.trim().is_empty() => {
            Err(AppError::Validation(format!("{field} cannot be empty")))
        }
        Some(v) => Ok(Some(v.trim().to_string())),
    }
}

/// GET /users/:id
pub async fn handle_get_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
) -> Result<Json<User>, AppError> {
    auth.ensure_self(user_id)?;
    Ok(Json(load_user(&state, user_id).await?))
}

/// PUT /users/:id
///
/// Partial update: only the fields present in the body change.
pub async fn handle_update_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<Value>, AppError> {
    auth.ensure_self(user_id)?;

    let changes = ProfileChanges {
        name: required_text(req.name, "name")?,
        surname: required_text(req.surname, "surname")?,
        email: req
            .email
            .map(|e| validate_email(&e.to_lowercase()))
            .transpose()
            .map_err(AppError::Validation)?,
        profile_picture: req
            .profile_picture
            .map(|p| p.trim().to_string())
            .map(|p| {
                if owns_picture(user_id, &p) {
                    Ok(p)
                } else {
                    Err(AppError::Validation(format!(
                        "profile_picture must be user_{user_id}.<ext>, got '{p}'"
                    )))
                }
            })
            .transpose()?,
    };
    if changes.is_empty() {
        return Err(AppError::Validation("No valid fields provided".to_string()));
    }

    let changed = store::update_profile(&state.db, user_id, &changes)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::Conflict("Email already in use".to_string())
            } else {
                AppError::Database(e)
            }
        })?;
    if changed == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    info!("Updated profile of user {user_id}");
    Ok(Json(json!({ "message": "User updated successfully" })))
}

/// POST /users/:id/check-password
pub async fn handle_check_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<CheckPasswordRequest>,
) -> Result<Json<CheckPasswordResponse>, AppError> {
    auth.ensure_self(user_id)?;
    let user = load_user(&state, user_id).await?;
    let valid = !req.password.is_empty() && verify_password(&req.password, &user.password_hash)?;
    Ok(Json(CheckPasswordResponse { valid }))
}

/// PUT /users/:id/update-password
pub async fn handle_update_password(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    Json(req): Json<UpdatePasswordRequest>,
) -> Result<Json<UpdatePasswordResponse>, AppError> {
    auth.ensure_self(user_id)?;
    let new_password = req
        .new_password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::Validation("Missing new password".to_string()))?;

    let password_hash = hash_password(&new_password)?;
    let changed = store::set_password_hash(&state.db, user_id, &password_hash).await?;
    if changed > 0 {
        info!("Password changed for user {user_id}");
    }
    Ok(Json(UpdatePasswordResponse {
        success: changed > 0,
    }))
}

/// POST /users/:id/profile-picture
///
/// Multipart field `profile_picture`. Stored as `user_{id}.{ext}`, replacing
/// any previous picture.
pub async fn handle_upload_profile_picture(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(user_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<ProfilePictureResponse>, AppError> {
    auth.ensure_self(user_id)?;
    let user = load_user(&state, user_id).await?;

    let file = read_file_field(&mut multipart, "profile_picture").await?;
    let ext = extension_of(&file.filename).unwrap_or_else(|| "jpg".to_string());
    if !PICTURE_EXTENSIONS.contains(&ext.as_str()) {
        return Err(AppError::Validation(format!(
            "Unsupported picture type '.{ext}'"
        )));
    }

    let picture_name = format!("user_{user_id}.{ext}");
    state
        .storage
        .put(
            &format!("{PICTURE_PREFIX}/{picture_name}"),
            file.data,
            &file.content_type,
        )
        .await?;

    if let Some(old) = user
        .profile_picture
        .filter(|old| *old != picture_name && owns_picture(user_id, old))
    {
        if let Err(e) = state.storage.delete(&format!("{PICTURE_PREFIX}/{old}")).await {
            warn!("Could not remove old picture {old} of user {user_id}: {e}");
        }
    }

    store::set_profile_picture(&state.db, user_id, &picture_name).await?;
    info!("Stored profile picture {picture_name}");

    Ok(Json(ProfilePictureResponse {
        profile_picture: format!(
            "{}/{PICTURE_PREFIX}/{picture_name}",
            state.config.public_base_url
        ),
    }))
}

/// GET /pictures/:name
pub async fn handle_get_picture(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    if name.contains('/') || name.contains('\\') {
        return Err(AppError::Validation(format!("Invalid file name: {name}")));
    }
    let data = state.storage.get(&format!("{PICTURE_PREFIX}/{name}")).await?;
    let content_type = crate::storage::guess_content_type(&name);
    Ok(([(header::CONTENT_TYPE, content_type)], data))
}
