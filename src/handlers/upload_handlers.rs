//! HTTP handlers for the upload lifecycle.
//!
//! Uploads arrive as multipart form data (an `audio` file part plus
//! optional `artist`/`title` text parts) and are streamed to storage
//! without buffering the payload in memory. Submitting immediately kicks
//! off background processing; the response never waits on the tool.

use axum::{
    Json,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use futures::TryStreamExt;
use serde::Deserialize;
use std::io;
use uuid::Uuid;

use crate::{
    context::RequestContext,
    errors::AppError,
    models::upload::UploadRecord,
    services::upload_service::UploadMetadata,
    state::AppState,
};

/// Body for `PATCH /api/uploads/{id}`.
#[derive(Debug, Deserialize)]
pub struct UpdateUploadReq {
    pub artist: Option<String>,
    pub title: Option<String>,
}

/// `POST /api/uploads` — accept a multipart audio upload.
///
/// Text parts seen before the file part travel with the insert; parts
/// arriving after it are applied as a metadata update, so field order in
/// the form does not matter.
pub async fn submit_upload(
    State(state): State<AppState>,
    ctx: RequestContext,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut metadata = UploadMetadata::default();
    let mut record: Option<UploadRecord> = None;
    let mut late_metadata = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::bad_request(format!("malformed multipart body: {}", err)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("artist") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                late_metadata = record.is_some();
                metadata.artist = Some(value);
            }
            Some("title") => {
                let value = field
                    .text()
                    .await
                    .map_err(|err| AppError::bad_request(err.to_string()))?;
                late_metadata = record.is_some();
                metadata.title = Some(value);
            }
            Some("audio") => {
                if record.is_some() {
                    return Err(AppError::bad_request("multiple audio parts"));
                }
                let content_type = field.content_type().map(|ct| ct.to_string());
                let filename = field
                    .file_name()
                    .map(|name| name.to_string())
                    .unwrap_or_else(|| "audio".into());
                let stream = field.map_err(io::Error::other);
                record = Some(
                    state
                        .uploads
                        .submit(
                            stream,
                            content_type.as_deref(),
                            &filename,
                            metadata.clone(),
                            ctx,
                        )
                        .await?,
                );
            }
            _ => {}
        }
    }

    let mut record = record.ok_or_else(|| AppError::bad_request("missing `audio` file part"))?;
    if late_metadata {
        record = state
            .uploads
            .update_metadata(record.id, metadata.artist, metadata.title, ctx)
            .await?;
    }

    state.uploads.begin_processing(record.id).await?;
    let record = state.uploads.fetch(record.id).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /api/uploads` — the caller's uploads, newest first (admins see
/// every record).
pub async fn list_uploads(
    State(state): State<AppState>,
    ctx: RequestContext,
) -> Result<Json<Vec<UploadRecord>>, AppError> {
    Ok(Json(state.uploads.list_for(ctx).await?))
}

/// `GET /api/uploads/{id}`
pub async fn get_upload(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<UploadRecord>, AppError> {
    let record = state.uploads.fetch(upload_id).await?;
    if !ctx.can_modify(record.owner_id) {
        return Err(AppError::forbidden("upload belongs to another user"));
    }
    Ok(Json(record))
}

/// `PATCH /api/uploads/{id}` — edit display metadata.
pub async fn update_upload(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(upload_id): Path<Uuid>,
    Json(req): Json<UpdateUploadReq>,
) -> Result<Json<UploadRecord>, AppError> {
    let record = state
        .uploads
        .update_metadata(upload_id, req.artist, req.title, ctx)
        .await?;
    Ok(Json(record))
}

/// `DELETE /api/uploads/{id}` — remove the record and its files.
pub async fn delete_upload(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(upload_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.uploads.delete(upload_id, ctx).await?;
    Ok(StatusCode::NO_CONTENT)
}
