//! Error taxonomy shared across the workspace.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the provisioning core.
///
/// The outer HTTP layer maps these onto status codes:
/// `InvalidArguments` to 400, `NotFound` to 404, `InvalidCredentials` and
/// `Unauthorized` to 403, `TimeoutExceeded` to 504, everything else to 500.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unauthorized")]
    Unauthorized,

    #[error("timeout exceeded")]
    TimeoutExceeded,

    #[error("cancelled")]
    Cancelled,

    #[error("{provider} api error: {message}")]
    Provider { provider: String, message: String },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(format!("io: {}", err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Internal(format!("serialization: {}", err))
    }
}
