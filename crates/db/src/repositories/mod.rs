use thiserror::Error;

use callbridge_core::session::SessionStoreError;

pub mod memory;
pub mod session;

pub use memory::InMemorySessionStore;
pub use session::SqlSessionStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error for `{key}`: {message}")]
    Decode { key: String, message: String },
}

impl From<RepositoryError> for SessionStoreError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Database(error) => Self::Backend(error.to_string()),
            RepositoryError::Decode { key, message } => Self::Decode { key, message },
        }
    }
}
