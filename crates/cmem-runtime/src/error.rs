use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    Store(cmem_store::Error),
    Types(cmem_types::Error),
    Io(std::io::Error),
    Config(String),
    NotFound(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store(err) => write!(f, "store error: {}", err),
            Error::Types(err) => write!(f, "type error: {}", err),
            Error::Io(err) => write!(f, "io error: {}", err),
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::NotFound(msg) => write!(f, "not found: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Store(err) => Some(err),
            Error::Types(err) => Some(err),
            Error::Io(err) => Some(err),
            Error::Config(_) | Error::NotFound(_) => None,
        }
    }
}

impl From<cmem_store::Error> for Error {
    fn from(err: cmem_store::Error) -> Self {
        Error::Store(err)
    }
}

impl From<cmem_types::Error> for Error {
    fn from(err: cmem_types::Error) -> Self {
        Error::Types(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Config(err.to_string())
    }
}
