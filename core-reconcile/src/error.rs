use bridge_traits::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },

    #[error("Invalid resolution for group {group_id}: {reason}")]
    InvalidResolution { group_id: String, reason: String },

    #[error("Cannot relocate track {track_id} to {path}: {reason}")]
    Relocation {
        track_id: String,
        path: String,
        reason: String,
    },

    #[error("Conflict on track {track_id}: {reason}")]
    Conflict { track_id: String, reason: String },

    #[error("Operation {operation_id} already in progress")]
    OperationInProgress { operation_id: String },

    #[error("Operation {operation_id} not found")]
    OperationNotFound { operation_id: String },

    #[error("Invalid operation ID: {0}")]
    InvalidOperationId(String),

    #[error("Invalid operation status: {0}")]
    InvalidStatus(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl ReconcileError {
    pub(crate) fn invalid_input(field: &str, message: impl Into<String>) -> Self {
        ReconcileError::InvalidInput {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn track_not_found(track_id: impl ToString) -> Self {
        ReconcileError::Library(LibraryError::NotFound {
            entity_type: "Track".to_string(),
            id: track_id.to_string(),
        })
    }

    pub(crate) fn conflict(track_id: impl ToString, reason: impl Into<String>) -> Self {
        ReconcileError::Conflict {
            track_id: track_id.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
