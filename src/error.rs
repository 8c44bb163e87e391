use std::sync::Arc;
use thiserror::Error;

/// Error values flowing through a pipeline.
///
/// `Error` is `Clone` because a single failure is observed twice: once by
/// the per-write callback and once by the stage's `error` event.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A caller-supplied failure reported through a completion.
    #[error("Error: {message}")]
    Operation { message: String },

    /// Underlying I/O errors from `IoSink` and `pump`.
    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    /// A structured chunk could not be encoded as JSON.
    #[error("JSON error: {0}")]
    Json(Arc<serde_json::Error>),
}

impl Error {
    /// Create a new `Operation` error with a descriptive message.
    pub fn operation(message: impl Into<String>) -> Self {
        Self::Operation {
            message: message.into(),
        }
    }

    /// Returns the message of an `Operation` error.
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Operation { message } => Some(message),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(Arc::new(err))
    }
}

/// Result type alias for the library operations.
pub type Result<T> = std::result::Result<T, Error>;
