use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibraryError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid input: {field} - {message}")]
    InvalidInput { field: String, message: String },
}

impl LibraryError {
    pub(crate) fn track_not_found(id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity_type: "Track".to_string(),
            id: id.to_string(),
        }
    }

    pub(crate) fn computer_not_found(id: impl ToString) -> Self {
        LibraryError::NotFound {
            entity_type: "Computer".to_string(),
            id: id.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, LibraryError>;
