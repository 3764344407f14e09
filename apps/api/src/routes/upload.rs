use axum::extract::Multipart;
use bytes::Bytes;

use crate::errors::AppError;
use crate::storage::guess_content_type;

/// One file taken out of a multipart body.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Reads the multipart field called `field_name`, skipping any others.
/// A missing field or an empty file is a validation error.
pub async fn read_file_field(
    multipart: &mut Multipart,
    field_name: &str,
) -> Result<UploadedFile, AppError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(field_name) {
            continue;
        }
        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "upload".to_string());
        let declared = field
            .content_type()
            .map(str::to_string)
            .filter(|ct| ct != "application/octet-stream");
        let data = field.bytes().await?;
        if data.is_empty() {
            return Err(AppError::Validation("Uploaded file is empty".to_string()));
        }
        let content_type = declared.unwrap_or_else(|| guess_content_type(&filename).to_string());
        return Ok(UploadedFile {
            filename,
            content_type,
            data,
        });
    }
    Err(AppError::Validation(format!(
        "Missing file field '{field_name}'"
    )))
}
