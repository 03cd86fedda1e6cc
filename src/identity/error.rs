use thiserror::Error;

use crate::identity::validation::FieldErrors;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("A user could not be found with ID [{id}].")]
    UserNotFound { id: i64 },

    /// A path segment that is not a user id at all.
    #[error("A user could not be found with ID [{id}].")]
    UnknownUserId { id: String },

    #[error("A group could not be found with ID [{id}].")]
    GroupNotFound { id: i64 },

    #[error("The submitted data is invalid")]
    Validation(FieldErrors),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("This account has not been activated")]
    NotActivated,

    #[error("This account has been banned")]
    Banned,

    #[error("Password hashing failed: {0}")]
    Password(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Database connection lock poisoned")]
    LockPoisoned,
}

impl IdentityError {
    /// Lookup failures that the panel reports back to the administrator.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            IdentityError::UserNotFound { .. }
                | IdentityError::UnknownUserId { .. }
                | IdentityError::GroupNotFound { .. }
        )
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;
