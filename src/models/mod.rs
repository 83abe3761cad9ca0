//! Core data models for the chordtrack service.
//!
//! `UploadRecord` maps to the `uploads` table via `sqlx::FromRow` and
//! serializes naturally as JSON via `serde`; `ChordTimeline` is the
//! on-disk chord artifact shape shared with the analysis tool.

pub mod chords;
pub mod upload;
