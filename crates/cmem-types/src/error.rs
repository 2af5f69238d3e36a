use std::fmt;

/// Result type for cmem-types operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur building or validating domain values
#[derive(Debug)]
pub enum Error {
    /// A value failed a domain invariant (bad clock JSON, empty turn list, etc.)
    Validation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}
