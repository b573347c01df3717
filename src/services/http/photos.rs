use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, Path, State,
    },
    Json,
};
use bytes::{Bytes, BytesMut};
use serde_json::{json, Value};

use super::{parse_id, AppState};
use crate::models::clients::ClientUpdate;
use crate::services::photos::{content_type_for, image_extension, photo_key};
use crate::services::ServiceError;

const PHOTO_FIELD: &str = "photo";

struct UploadedPhoto {
    extension: String,
    data: Bytes,
}

fn upload_error(error: MultipartError) -> ServiceError {
    ServiceError::Upload(error.body_text())
}

/// Whole MB or KB when the limit divides evenly, bytes otherwise.
fn size_label(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;

    match bytes {
        0 => "0 bytes".to_string(),
        b if b % MB == 0 => format!("{} MB", b / MB),
        b if b % KB == 0 => format!("{} KB", b / KB),
        b => format!("{} bytes", b),
    }
}

fn no_file() -> ServiceError {
    ServiceError::Upload("No file uploaded".to_string())
}

/// Pulls the single `photo` part out of the form. The size cap is checked
/// chunk by chunk so an oversize upload is never buffered whole.
async fn read_photo(
    multipart: &mut Multipart,
    max_bytes: usize,
) -> Result<UploadedPhoto, ServiceError> {
    let mut photo = None;

    while let Some(mut field) = multipart.next_field().await.map_err(upload_error)? {
        if field.name() != Some(PHOTO_FIELD) {
            continue;
        }
        if photo.is_some() {
            return Err(ServiceError::Upload("Multiple files not supported".to_string()));
        }

        let extension =
            image_extension(field.file_name().unwrap_or_default(), field.content_type())
                .ok_or_else(|| {
                    ServiceError::Upload(
                        "Invalid file type. Only JPG, PNG, and GIF files are allowed.".to_string(),
                    )
                })?;

        let mut data = BytesMut::new();
        while let Some(chunk) = field.chunk().await.map_err(upload_error)? {
            if data.len() + chunk.len() > max_bytes {
                return Err(ServiceError::Upload(format!(
                    "File too large. Maximum size is {}.",
                    size_label(max_bytes)
                )));
            }
            data.extend_from_slice(&chunk);
        }

        if data.is_empty() {
            return Err(no_file());
        }

        photo = Some(UploadedPhoto {
            extension,
            data: data.freeze(),
        });
    }

    photo.ok_or_else(no_file)
}

pub async fn upload_client_photo(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ServiceError> {
    let id = parse_id(&id, "client")?;

    let existing = state
        .storage
        .get_client(id)
        .await
        .map_err(|e| ServiceError::storage("Failed to upload photo", e))?;
    if existing.is_none() {
        return Err(ServiceError::not_found("Client"));
    }

    let mut multipart = multipart.map_err(|_| no_file())?;
    let photo = read_photo(&mut multipart, state.max_photo_bytes).await?;

    let key = photo_key(id, &photo.extension);
    let size = photo.data.len();
    let photo_url = state
        .photo_store
        .put(&key, photo.data, content_type_for(&photo.extension))
        .await
        .map_err(|e| ServiceError::storage("Failed to upload photo", e))?;

    let client = state
        .storage
        .update_client(id, ClientUpdate::photo(photo_url.clone()))
        .await
        .map_err(|e| ServiceError::storage("Failed to update client with photo", e))?
        .ok_or_else(|| {
            ServiceError::storage(
                "Failed to update client with photo",
                format!("client {} disappeared during upload", id),
            )
        })?;

    log::info!("Stored {} byte photo for client {} at {}", size, id, photo_url);

    Ok(Json(json!({
        "message": "Photo uploaded successfully",
        "photoUrl": photo_url,
        "client": client,
    })))
}
