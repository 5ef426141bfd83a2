use crate::api::rest::{ApiResult, AppState};
use crate::error::Error;
use crate::services::UploadOutcome;
use axum::extract::multipart::{Multipart, MultipartRejection};
use axum::extract::State;
use axum::response::Json;
use log::info;

/// Multipart field carrying the image
const FILE_FIELD: &str = "file";

/// Accept one image, count the people in it and return the annotated output path
pub async fn upload_image(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Json<UploadOutcome>> {
    let mut multipart =
        multipart.map_err(|e| Error::BadUpload(format!("Expected a multipart upload: {}", e)))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadUpload(format!("Unreadable multipart payload: {}", e)))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| Error::BadUpload(format!("Unreadable multipart payload: {}", e)))?;
        upload = Some((filename, data));
        break;
    }

    let (filename, data) =
        upload.ok_or_else(|| Error::BadUpload(format!("No '{}' field in upload", FILE_FIELD)))?;
    info!(
        "Received upload {} ({} bytes)",
        filename.as_deref().unwrap_or("<unnamed>"),
        data.len()
    );

    let outcome = state
        .pipeline
        .process_upload(filename.as_deref(), &data)
        .await?;

    Ok(Json(outcome))
}
