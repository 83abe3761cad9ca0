//! Route table.
//!
//! ## Structure
//! - **Upload lifecycle**
//!   - `POST   /api/uploads` — multipart audio upload, kicks off processing
//!   - `GET    /api/uploads` — list the caller's uploads
//!   - `GET    /api/uploads/{id}` — fetch one record
//!   - `PATCH  /api/uploads/{id}` — edit artist/title
//!   - `DELETE /api/uploads/{id}` — delete record + files
//!
//! - **Chord timelines**
//!   - `GET  /api/chords/{uploadId}` — timeline JSON (or "unavailable" shape)
//!   - `POST /api/chords/{uploadId}/regenerate` — re-analyze from a stem
//!
//! - **Artifacts & probes**
//!   - `GET /processed/{uploadId}/{file}` — stream stem audio / waveforms
//!   - `GET /healthz`, `GET /readyz`

use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    handlers::{
        chord_handlers::{get_chords, regenerate_chords},
        health_handlers::{healthz, readyz},
        media_handlers::get_processed_file,
        upload_handlers::{
            delete_upload, get_upload, list_uploads, submit_upload, update_upload,
        },
    },
    state::AppState,
};

/// Build and return the router for the whole HTTP surface.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // upload lifecycle
        .route("/api/uploads", post(submit_upload).get(list_uploads))
        .route(
            "/api/uploads/{id}",
            get(get_upload).patch(update_upload).delete(delete_upload),
        )
        // chord timelines
        .route("/api/chords/{upload_id}", get(get_chords))
        .route("/api/chords/{upload_id}/regenerate", post(regenerate_chords))
        // processed artifacts
        .route("/processed/{upload_id}/{file}", get(get_processed_file))
}
