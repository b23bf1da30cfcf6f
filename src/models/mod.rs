pub mod session;
pub mod snippet;
pub mod user;

use diesel::result::Error as DieselError;
use thiserror::Error;

/// Errors surfaced by the data-access layer.
///
/// Handlers branch on the first three variants; everything else is an
/// infrastructure failure and becomes a generic server error.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("no matching record found")]
    NoRecord,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("database error")]
    Database(#[source] DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("failed to hash password: {0}")]
    PasswordHashing(String),
}

impl From<DieselError> for ModelError {
    fn from(error: DieselError) -> Self {
        match error {
            DieselError::NotFound => ModelError::NoRecord,
            other => ModelError::Database(other),
        }
    }
}

pub type ModelResult<T> = Result<T, ModelError>;
