//! Streaming access to processed artifacts (stem audio, waveform
//! images) under `/processed/{uploadId}/{file}`.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use std::path::PathBuf;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{errors::AppError, models::upload::ProcessingStatus, state::AppState};

/// Content types for the artifact kinds the separation pipeline writes.
fn content_type_for(file: &str) -> &'static str {
    match file.rsplit_once('.').map(|(_, ext)| ext) {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("png") => "image/png",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

/// `GET /processed/{uploadId}/{file}` — stream one processed artifact.
pub async fn get_processed_file(
    State(state): State<AppState>,
    Path((upload_id, file)): Path<(Uuid, String)>,
) -> Result<Response, AppError> {
    if file.contains(['/', '\\']) || file.contains("..") || file.is_empty() {
        return Err(AppError::bad_request("invalid file name"));
    }

    let record = state.uploads.fetch(upload_id).await?;
    if record.status != ProcessingStatus::Completed {
        return Err(AppError::not_found("upload has no processed output"));
    }
    let Some(result_path) = record.result_path else {
        return Err(AppError::not_found("upload has no processed output"));
    };

    let path = PathBuf::from(result_path).join(&file);
    let handle = File::open(&path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            AppError::not_found(format!("no such artifact `{}`", file))
        } else {
            AppError::internal(err.to_string())
        }
    })?;

    let len = handle.metadata().await.map(|m| m.len()).ok();
    let body = Body::from_stream(ReaderStream::new(handle));

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::OK;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(content_type_for(&file)),
    );
    if let Some(len) = len {
        if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
            response.headers_mut().insert(header::CONTENT_LENGTH, value);
        }
    }
    Ok(response)
}
