//! HTTP handlers for chord timeline access and regeneration.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    context::RequestContext,
    errors::AppError,
    models::chords::{ChordEvent, ChordTimeline},
    models::upload::Stem,
    services::chord_service::TimelineLoad,
    state::AppState,
};

/// Wire shape of a chord timeline.
///
/// Missing chord data is reported inside a 200 response (empty events +
/// `error` string) rather than as an HTTP error: for the player page it
/// is an informational state, not a failure.
#[derive(Debug, Serialize)]
pub struct ChordsResponse {
    pub duration: f64,
    pub events: Vec<ChordEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ChordTimeline> for ChordsResponse {
    fn from(timeline: ChordTimeline) -> Self {
        Self {
            duration: timeline.duration,
            events: timeline.events,
            error: None,
        }
    }
}

impl ChordsResponse {
    fn unavailable(reason: String) -> Self {
        Self {
            duration: 0.0,
            events: Vec::new(),
            error: Some(reason),
        }
    }
}

/// Body for `POST /api/chords/{uploadId}/regenerate`.
///
/// The stem arrives as a free string and is validated here so an unknown
/// value maps to 400 rather than a generic deserialization rejection.
#[derive(Debug, Deserialize)]
pub struct RegenerateReq {
    pub stem: String,
}

/// `GET /api/chords/{uploadId}`
pub async fn get_chords(
    State(state): State<AppState>,
    Path(upload_id): Path<Uuid>,
) -> Result<Json<ChordsResponse>, AppError> {
    let response = match state.chords.load(upload_id).await? {
        TimelineLoad::Ready(timeline) => timeline.into(),
        TimelineLoad::Unavailable { reason } => ChordsResponse::unavailable(reason),
    };
    Ok(Json(response))
}

/// `POST /api/chords/{uploadId}/regenerate` — re-run chord extraction
/// against the chosen stem and return the fresh timeline. Blocks until
/// the tool exits.
pub async fn regenerate_chords(
    State(state): State<AppState>,
    ctx: RequestContext,
    Path(upload_id): Path<Uuid>,
    Json(req): Json<RegenerateReq>,
) -> Result<Json<ChordsResponse>, AppError> {
    let stem: Stem = req
        .stem
        .parse()
        .map_err(|err: String| AppError::bad_request(err))?;

    let timeline = state.chords.regenerate(upload_id, stem, ctx).await?;
    Ok(Json(timeline.into()))
}
