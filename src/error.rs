use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input, rejected before any mutation.
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("item {0} not found")]
    ItemNotFound(i64),

    #[error("user '{0}' not found")]
    UserNotFound(String),

    /// A prompt (or username) that already exists, matched
    /// case/whitespace-insensitively.
    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}
