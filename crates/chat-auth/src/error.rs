//! Error types for identity operations

use chat_api::ApiError;

/// Errors from credential/session storage and sign-in.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("sign-in failed: {0}")]
    SignIn(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for identity operations.
pub type Result<T> = std::result::Result<T, Error>;
