use std::path::Path;
use std::pin::pin;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::header::{self, HeaderMap, HeaderValue};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::TempPath;
use tokio::fs::{File, create_dir_all};
use tokio::io::{self, AsyncWriteExt};

use crate::api::dto::{DownloadQuery, StatusRequest, StatusResponse, UploadResponse};
use crate::domain::upload::form::ChunkForm;
use crate::domain::upload::model::{MergeOutcome, UploadKey};
use crate::error::AppError;
use crate::storage::ChunkSource;
use crate::utils::digest::ContentDigest;
use crate::utils::state::AppState;
use crate::utils::validation::{is_valid_uploader_id, parse_range_start};

/// POST /BigFileUploader
pub async fn upload_chunk_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    // The spooled body is deleted when `spooled` drops, unless the chunk
    // store has already moved it into the session.
    let (form, spooled) = read_chunk_form(&state.config.spool_dir, multipart).await?;
    let Some(spooled) = spooled else {
        return Err(AppError::MissingRequiredField("file"));
    };

    let upload = form.validate(state.uploads.algorithm())?;
    let (index, total) = (upload.index, upload.declared_total);

    let outcome = state
        .uploads
        .accept_chunk(upload, ChunkSource::TempFile(spooled.to_path_buf()))
        .await?;

    match outcome {
        MergeOutcome::Pending { .. } => Ok(Json(UploadResponse::pending(index, total))),
        MergeOutcome::Committed { path } => Ok(Json(UploadResponse::committed(
            path.display().to_string(),
        ))),
    }
}

/// Reads the multipart body, spooling the `file` field to disk and
/// collecting every other field as text.
async fn read_chunk_form(
    spool_dir: &Path,
    mut multipart: Multipart,
) -> Result<(ChunkForm, Option<TempPath>), AppError> {
    let mut form = ChunkForm::default();
    let mut spooled = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            spooled = Some(spool_stream(spool_dir, field).await?);
        } else {
            form.set(&name, field.text().await?);
        }
    }
    Ok((form, spooled))
}

/// Streams `body` into a fresh file under `spool_dir`. The file is removed
/// if the body fails or the future is dropped before the body ends.
async fn spool_stream<S, E>(spool_dir: &Path, body: S) -> Result<TempPath, AppError>
where
    S: Stream<Item = Result<Bytes, E>>,
    AppError: From<E>,
{
    create_dir_all(spool_dir).await?;
    let path = TempPath::from_path(spool_dir.join(uuid::Uuid::new_v4().to_string()));
    let mut file = File::create(&path).await?;

    let mut body = pin!(body);
    while let Some(bytes) = body.next().await {
        file.write_all(&bytes?).await?;
    }
    file.flush().await?;
    Ok(path)
}

/// GET /BigFileDownloader?file_md5=<digest>&user_uid=<uid>&skip_length=<offset>
///
/// A `Range: bytes=<offset>-` header takes precedence over `skip_length`.
pub async fn download_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DownloadQuery>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let file_md5 = non_empty(query.file_md5).ok_or(AppError::MissingRequiredField("file_md5"))?;
    non_empty(query.user_uid).ok_or(AppError::MissingRequiredField("user_uid"))?;
    let digest = ContentDigest::parse_field(state.uploads.algorithm(), "file_md5", &file_md5)?;

    let offset = match headers.get(header::RANGE).and_then(|v| v.to_str().ok()) {
        Some(range) => parse_range_start(range).ok_or_else(|| AppError::InvalidField {
            field: "Range",
            reason: format!("unsupported range `{range}`, expected `bytes=<offset>-`"),
        })?,
        None => match non_empty(query.skip_length) {
            Some(raw) => raw.parse().map_err(|_| AppError::InvalidField {
                field: "skip_length",
                reason: format!("`{raw}` is not a valid offset"),
            })?,
            None => 0,
        },
    };

    let download = state.uploads.fetch_artifact(&digest, offset).await?;
    let content = download.content;
    let total = content.total_length;
    let remaining = content.remaining();

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        header_value(format!(
            "attachment; filename={}",
            download.info.file_name
        ))?,
    );
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(remaining));
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    let status = if offset > 0 && remaining > 0 {
        response_headers.insert(
            header::CONTENT_RANGE,
            header_value(format!("bytes {}-{}/{}", offset, total - 1, total))?,
        );
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    tracing::debug!(
        "serving {} from offset {} ({} of {} bytes)",
        download.info.file_name,
        offset,
        remaining,
        total
    );
    Ok((status, response_headers, Body::from_stream(content.stream)).into_response())
}

/// POST /api/file/status
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StatusRequest>,
) -> Result<Json<StatusResponse>, AppError> {
    let query = request
        .new_data
        .ok_or(AppError::MissingRequiredField("newData"))?;
    let file_md5 = non_empty(query.file_md5).ok_or(AppError::MissingRequiredField("file_md5"))?;
    let user_uid = non_empty(query.user_uid).ok_or(AppError::MissingRequiredField("user_uid"))?;

    let digest = ContentDigest::parse_field(state.uploads.algorithm(), "file_md5", &file_md5)?;
    if !is_valid_uploader_id(&user_uid) {
        return Err(AppError::InvalidField {
            field: "user_uid",
            reason: "contains unsupported characters".to_string(),
        });
    }

    let view = state
        .uploads
        .query_status(&UploadKey::new(digest, user_uid))
        .await?;
    Ok(Json(StatusResponse {
        success: true,
        return_value: view.into(),
    }))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn header_value(value: String) -> Result<HeaderValue, AppError> {
    HeaderValue::try_from(value)
        .map_err(|err| AppError::Io(io::Error::new(io::ErrorKind::InvalidData, err)))
}
