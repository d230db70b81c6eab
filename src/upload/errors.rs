use thiserror::Error;
use super::types::TaskId;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("HTTP Request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid header value: {0}")]
    InvalidHeaderValue(#[from] reqwest::header::InvalidHeaderValue),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("Config error: {0}")]
    ConfigError(#[from] toml::de::Error),

    #[error("Unknown task: {0}")]
    UnknownTask(TaskId),

    #[error("Task {0} already finished")]
    TaskFinished(TaskId),

    #[error("Param error: {0}")]
    ParamError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl UploadError {
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }
}

/// Failure reported by a transport for one upload.
///
/// Stored on the failed task, so it has to stay cheap to clone.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP Request error: {0}")]
    Http(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Server error: status code {status_code}, message: {message}")]
    Server {
        status_code: u16,
        message: String,
    },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Transport unavailable: {0}")]
    Unavailable(String),

    #[error("Upload was cancelled")]
    Cancelled,
}

impl TransportError {
    pub fn server_error(status_code: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status_code,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

impl From<reqwest::header::InvalidHeaderValue> for TransportError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        Self::Http(err.to_string())
    }
}

/// Error alias
pub type Result<T, E = UploadError> = std::result::Result<T, E>;
