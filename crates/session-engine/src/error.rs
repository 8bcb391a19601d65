//! Error types for the session engine

use chat_api::{ApiError, ErrorClassification};

use crate::classify::{Classify, classify};

/// Errors from authenticated operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Auth(#[from] chat_auth::Error),

    #[error("no private keys available")]
    NoPrivateKey,

    #[error("not authenticated: no session token")]
    NotAuthenticated,

    #[error("login failed for all {attempts} private keys: {last}")]
    AuthFailed { attempts: usize, last: Box<Error> },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl Error {
    /// Recovery strategy for this error.
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Error::Api(e) => classify(e),
            Error::Auth(e) => e.classification(),
            Error::AuthFailed { last, .. } => last.classification(),
            Error::NoPrivateKey | Error::NotAuthenticated | Error::InvalidResponse(_) => {
                ErrorClassification::Fatal
            }
        }
    }
}

/// Result alias for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
