//! Shared application state carried by the router.

use crate::services::{chord_service::ChordService, upload_service::UploadService};

#[derive(Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub chords: ChordService,
}
