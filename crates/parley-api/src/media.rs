use axum::{
    Extension, Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::error;
use uuid::Uuid;

use parley_db::Database;
use parley_types::api::{MediaInfo, MediaUpload};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::CurrentUser;

/// 25 MB upload limit
const MAX_FILE_SIZE: usize = 25 * 1024 * 1024;

/// The attachment registrar: turn raw upload metadata into a media record.
///
/// An upload without a storage key means no file was actually stored, so the
/// registration is rejected; callers with an *optional* upload simply don't
/// call this. Media rows are immutable — this only ever inserts.
pub fn register_media(db: &Database, upload: &MediaUpload) -> Result<MediaInfo, ApiError> {
    if upload.hash.is_empty() {
        return Err(ApiError::Validation("Upload has no storage key".into()));
    }

    let id = Uuid::new_v4();
    db.create_media(&id.to_string(), &upload.hash, &upload.kind, &upload.format)?;

    Ok(MediaInfo {
        id,
        hash: upload.hash.clone(),
        kind: upload.kind.clone(),
        format: upload.format.clone(),
    })
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    /// Category tag for the upload ("attachment", "avatar", ...).
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "attachment".to_string()
}

/// POST /media — accepts raw bytes, stores them under their SHA-256 content
/// hash, and returns the upload metadata to pass along with a message or
/// profile update. No media record is created yet; that happens when the
/// referencing write registers the attachment.
pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    Extension(_user): Extension<CurrentUser>,
    headers: HeaderMap,
    bytes: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    if bytes.is_empty() {
        return Err(ApiError::Validation("Empty upload".into()));
    }
    if bytes.len() > MAX_FILE_SIZE {
        return Err(ApiError::Validation("Upload too large".into()));
    }

    let format = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();

    let hash = hex::encode(Sha256::digest(&bytes));

    tokio::fs::create_dir_all(&state.upload_dir).await.map_err(|e| {
        error!("Failed to create upload dir: {}", e);
        ApiError::Internal(e.into())
    })?;

    let path = state.upload_dir.join(&hash);
    tokio::fs::write(&path, &bytes).await.map_err(|e| {
        error!("Failed to write upload {}: {}", path.display(), e);
        ApiError::Internal(e.into())
    })?;

    Ok((
        StatusCode::CREATED,
        Json(MediaUpload {
            hash,
            kind: query.kind,
            format,
        }),
    ))
}

/// GET /media/{id} — looks the media record up, then serves the stored blob.
pub async fn download(
    State(state): State<AppState>,
    Path(media_id): Path<String>,
    Extension(_user): Extension<CurrentUser>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate before touching the database or filesystem.
    media_id
        .parse::<Uuid>()
        .map_err(|_| ApiError::Validation("Invalid media id".into()))?;

    let db = state.clone();
    let id = media_id.clone();
    let row = tokio::task::spawn_blocking(move || db.db.get_media(&id))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??
        .ok_or(ApiError::NotFound)?;

    // Storage keys are content hashes; anything else never touches the disk
    // (path traversal guard).
    if !row.hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(ApiError::NotFound);
    }

    let path = state.upload_dir.join(&row.hash);
    let bytes = tokio::fs::read(&path).await.map_err(|e| {
        error!("Failed to read media blob {}: {}", path.display(), e);
        ApiError::NotFound
    })?;

    Ok(([(header::CONTENT_TYPE, row.format)], bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registrar_rejects_missing_storage_key() {
        let db = Database::open_in_memory().unwrap();
        let upload = MediaUpload {
            hash: String::new(),
            kind: "attachment".into(),
            format: "image/png".into(),
        };

        let err = register_media(&db, &upload).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn registrar_creates_an_immutable_record() {
        let db = Database::open_in_memory().unwrap();
        let upload = MediaUpload {
            hash: "cafe01".into(),
            kind: "avatar".into(),
            format: "image/png".into(),
        };

        let info = register_media(&db, &upload).unwrap();
        let row = db.get_media(&info.id.to_string()).unwrap().unwrap();
        assert_eq!(row.hash, "cafe01");
        assert_eq!(row.kind, "avatar");

        // Registering the same metadata again makes a second record, it
        // never overwrites the first.
        let second = register_media(&db, &upload).unwrap();
        assert_ne!(info.id, second.id);
    }
}
