use axum::{
    extract::{Multipart, State},
    http::{header, StatusCode},
    response::IntoResponse,
};
use std::collections::BTreeMap;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::attachments::store::{insert_upload, NewUpload};
use crate::auth::extractor::AuthUser;
use crate::cv::validation::{validate_form, CvField, CvForm, FieldError, FormValidation};
use crate::errors::AppError;
use crate::render::RenderError;
use crate::routes::extract::Json;
use crate::routes::upload::read_file_field;
use crate::state::AppState;
use crate::storage::{guess_content_type, sanitize_filename};

const CV_PICTURE_PREFIX: &str = "cv";

#[derive(Debug, Deserialize)]
pub struct ValidateFieldRequest {
    pub field: Option<String>,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateFieldResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// What the renderer receives: the normalized form plus the picture, if any,
/// inlined as a `data:` URL.
#[derive(Debug, Serialize)]
struct RenderRequest<'a> {
    #[serde(flatten)]
    fields: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    picture: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct UploadPictureResponse {
    pub ok: bool,
    pub path: String,
}

/// POST /validate
///
/// Checks one wizard field. Rule failures are a normal `200` with `ok: false`;
/// only an unknown field name is a client error.
pub async fn handle_validate_field(
    Json(req): Json<ValidateFieldRequest>,
) -> (StatusCode, Json<ValidateFieldResponse>) {
    let name = req.field.unwrap_or_default();
    let field = match name.parse::<CvField>() {
        Ok(f) => f,
        Err(error) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ValidateFieldResponse {
                    ok: false,
                    value: None,
                    error: Some(error),
                }),
            )
        }
    };

    let response = match field.validate(&req.value, Local::now().date_naive()) {
        Ok(value) => ValidateFieldResponse {
            ok: true,
            value: Some(value),
            error: None,
        },
        Err(error) => ValidateFieldResponse {
            ok: false,
            value: None,
            error: Some(error),
        },
    };
    (StatusCode::OK, Json(response))
}

/// POST /cv/validate
pub async fn handle_validate_form(Json(form): Json<CvForm>) -> Json<FormValidation> {
    Json(validate_form(&form, Local::now().date_naive()))
}

/// POST /upload-picture
///
/// Stores a CV picture and returns the key to pass back as `picture_path`.
pub async fn handle_upload_picture(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> Result<Json<UploadPictureResponse>, AppError> {
    let file = read_file_field(&mut multipart, "file").await?;
    if !file.content_type.starts_with("image/") {
        return Err(AppError::Validation(format!(
            "Expected an image, got {}",
            file.content_type
        )));
    }

    let key = cv_picture_key(auth.id, &file.filename);
    let size_bytes = file.data.len() as i64;
    state.storage.put(&key, file.data, &file.content_type).await?;
    insert_upload(
        &state.db,
        NewUpload {
            filename: &file.filename,
            storage_key: &key,
            content_type: &file.content_type,
            size_bytes,
            user_id: auth.id,
            event_id: None,
        },
    )
    .await?;

    info!("Stored CV picture {key} for user {}", auth.id);
    Ok(Json(UploadPictureResponse { ok: true, path: key }))
}

/// Storage key for an uploaded CV picture, scoped to its owner.
pub fn cv_picture_key(user_id: i64, filename: &str) -> String {
    format!(
        "{CV_PICTURE_PREFIX}/{user_id}/{}-{}",
        Uuid::new_v4(),
        sanitize_filename(filename)
    )
}

fn invalid_fields(errors: &[FieldError]) -> AppError {
    match serde_json::to_value(errors) {
        Ok(details) => AppError::InvalidFields(details),
        Err(e) => AppError::Internal(e.into()),
    }
}

/// POST /generate-cv
///
/// Validates the whole form, then hands it to the external renderer and
/// streams the PDF back.
pub async fn handle_generate_cv(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(form): Json<CvForm>,
) -> Result<impl IntoResponse, AppError> {
    let validation = validate_form(&form, Local::now().date_naive());
    if !validation.ok {
        return Err(invalid_fields(&validation.errors));
    }

    let picture_key = validation
        .fields
        .get(CvField::PicturePath.as_str())
        .filter(|key| !key.is_empty());
    if let Some(key) = picture_key {
        if !key.starts_with(&format!("{CV_PICTURE_PREFIX}/{}/", auth.id)) {
            return Err(invalid_fields(&[FieldError {
                field: CvField::PicturePath,
                error: "picture was not uploaded by this account".to_string(),
            }]));
        }
    }

    let renderer = state.cv_renderer.as_ref().ok_or_else(|| {
        AppError::NotImplemented("CV rendering is not configured".to_string())
    })?;

    let picture = match picture_key {
        Some(key) => {
            let data = state.storage.get(key).await?;
            Some(format!(
                "data:{};base64,{}",
                guess_content_type(key),
                STANDARD.encode(&data)
            ))
        }
        None => None,
    };

    let request = RenderRequest {
        fields: &validation.fields,
        picture,
    };
    let pdf = renderer.render(&request).await.map_err(|e| {
        warn!("CV render for user {} failed: {e}", auth.id);
        // The renderer rejected our input; retrying elsewhere won't help.
        let rejected = matches!(e, RenderError::Api { status, .. } if status < 500 && status != 429);
        if rejected {
            AppError::UnprocessableEntity(e.to_string())
        } else {
            AppError::Upstream(e.to_string())
        }
    })?;

    info!("Generated CV for {} ({} bytes)", auth.username, pdf.len());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"cv.pdf\""),
        ],
        pdf,
    ))
}
