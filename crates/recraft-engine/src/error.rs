use thiserror::Error;

/// Fallback when the service reports an error code without a message.
pub const EMPTY_SERVICE_MESSAGE: &str = "empty error message";

/// Failures the toolkit raises itself. Transport and decode failures are
/// plain `anyhow` errors; these travel inside `anyhow::Error` and can be
/// recovered with `downcast_ref::<RecraftError>()`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecraftError {
    /// No usable credential; raised before any network call.
    #[error("{0}")]
    Configuration(String),
    /// A node input failed its schema check; raised before any network call.
    #[error("{0}")]
    Validation(String),
    /// The service answered with an error-code payload.
    #[error("{message}")]
    Service {
        code: Option<String>,
        message: String,
    },
}

impl RecraftError {
    pub fn configuration(message: impl Into<String>) -> anyhow::Error {
        RecraftError::Configuration(message.into()).into()
    }

    pub fn validation(message: impl Into<String>) -> anyhow::Error {
        RecraftError::Validation(message.into()).into()
    }
}

/// Finds the typed kind anywhere in an error chain.
pub fn recraft_error(err: &anyhow::Error) -> Option<&RecraftError> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<RecraftError>())
}
