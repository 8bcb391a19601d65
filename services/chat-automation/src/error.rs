//! Service-specific error types

use chat_api::ErrorClassification;
use thiserror::Error;

/// Automation errors.
///
/// Engine errors keep their classification so the scheduler can tell a
/// rate limit from a transient fault from a hard failure.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] session_engine::Error),

    #[error("content generation failed: {0}")]
    Generator(String),

    #[error("automation is already running")]
    AlreadyRunning,

    #[error("automation is not running")]
    NotRunning,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

impl Error {
    pub fn classification(&self) -> ErrorClassification {
        match self {
            Error::Engine(e) => e.classification(),
            // The generator is an external provider; treat its outages like
            // any other network fault.
            Error::Generator(_) => ErrorClassification::Transient,
            Error::AlreadyRunning | Error::NotRunning | Error::UnknownCommand(_) => {
                ErrorClassification::Fatal
            }
        }
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use chat_api::ApiError;

    #[test]
    fn engine_errors_keep_classification() {
        let err = Error::from(session_engine::Error::Api(ApiError::Status {
            status: 429,
            body: String::new(),
        }));
        assert_eq!(err.classification(), ErrorClassification::RateLimited);
        assert!(err.to_string().contains("429"));
    }

    #[test]
    fn error_display_messages_are_descriptive() {
        assert_eq!(
            Error::AlreadyRunning.to_string(),
            "automation is already running"
        );
        assert!(
            Error::UnknownCommand("jump".into())
                .to_string()
                .contains("jump")
        );
        assert_eq!(
            Error::Generator("quota".into()).classification(),
            ErrorClassification::Transient
        );
    }
}
