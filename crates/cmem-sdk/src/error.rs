use std::fmt;

/// Result type alias for SDK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for SDK operations.
#[derive(Debug)]
pub enum Error {
    /// Resource not found (chunk, project, cluster, etc.).
    NotFound(String),
    /// Invalid input parameters or configuration.
    InvalidInput(String),
    /// The background task running the operation panicked or was dropped.
    TaskFailed(String),
    /// Error from the underlying runtime layer.
    Runtime(cmem_runtime::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
            Error::InvalidInput(msg) => write!(f, "invalid input: {}", msg),
            Error::TaskFailed(msg) => write!(f, "background task failed: {}", msg),
            Error::Runtime(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Runtime(err) => Some(err),
            Error::NotFound(_) | Error::InvalidInput(_) | Error::TaskFailed(_) => None,
        }
    }
}

impl From<cmem_runtime::Error> for Error {
    fn from(err: cmem_runtime::Error) -> Self {
        Error::Runtime(err)
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::TaskFailed(err.to_string())
    }
}

/// Classifies a failed [`Error`] into the short hint embedded in a
/// [`crate::DegradedResult`], per the degraded-result contract: retrieval
/// failures must never crash the caller, only explain themselves briefly.
pub fn degraded_hint(err: &Error) -> &'static str {
    match err {
        Error::NotFound(_) => "unknown project or session",
        Error::InvalidInput(_) => "invalid request",
        Error::TaskFailed(_) => "internal task failure",
        Error::Runtime(cmem_runtime::Error::Store(_)) => "storage unavailable",
        Error::Runtime(cmem_runtime::Error::Types(_)) => "invalid stored data",
        Error::Runtime(cmem_runtime::Error::Io(_)) => "storage unavailable",
        Error::Runtime(cmem_runtime::Error::Config(_)) => "configuration error",
        Error::Runtime(cmem_runtime::Error::NotFound(_)) => "unknown project or session",
    }
}
