//! chordtrack — audio upload, stem separation, and chord timeline
//! synchronization service.

pub mod config;
pub mod context;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod playback;
pub mod routes;
pub mod services;
pub mod state;
