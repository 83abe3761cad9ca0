//! Service layer: upload lifecycle, external analysis tool client, and
//! chord timeline access/regeneration.

pub mod analyzer;
pub mod chord_service;
pub mod upload_service;

use std::io;
use thiserror::Error;
use uuid::Uuid;

use crate::models::upload::ProcessingStatus;

/// Failure taxonomy shared by the service layer.
///
/// Validation and permission errors surface immediately to the caller;
/// tool failures during initial processing are recorded on the upload row
/// and logged (the triggering request has already returned); tool failures
/// during regeneration propagate to the blocking caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("upload `{id}` is {actual}, operation requires {required}")]
    InvalidState {
        id: Uuid,
        actual: ProcessingStatus,
        required: ProcessingStatus,
    },

    #[error("upload `{0}` not found")]
    NotFound(Uuid),

    #[error("analysis tool failed: {0}")]
    ToolFailure(String),

    #[error(transparent)]
    Storage(#[from] io::Error),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

pub type ServiceResult<T> = Result<T, ServiceError>;
