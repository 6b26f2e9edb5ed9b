use thiserror::Error;

use crate::provider::AllFailed;

/// Errors surfaced by lessonkit operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The payload exceeds the configured ceiling. Nothing was written.
    #[error("payload of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },
    /// The source could not be parsed in its expected format.
    #[error("malformed document: {0}")]
    MalformedDocument(String),
    /// Best-effort size reduction could not be performed.
    #[error("compression unsupported: {0}")]
    CompressionUnsupported(String),
    /// A page selector or other caller input could not be used.
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Every configured provider failed, or none was configured.
    #[error(transparent)]
    AllFailed(#[from] AllFailed),
    #[error("archive error: {0}")]
    Archive(String),
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Who is to blame for a failure, for status classification at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
}

impl Error {
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::TooLarge { .. }
            | Error::MalformedDocument(_)
            | Error::InvalidSelection(_)
            | Error::NotFound(_) => ErrorClass::Client,
            Error::CompressionUnsupported(_)
            | Error::AllFailed(_)
            | Error::Archive(_)
            | Error::Io(_) => ErrorClass::Server,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(e: zip::result::ZipError) -> Self {
        match e {
            zip::result::ZipError::Io(io) => Error::Io(io),
            other => Error::Archive(other.to_string()),
        }
    }
}

/// Result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_and_bad_input_are_client_errors() {
        assert_eq!(
            Error::TooLarge { size: 2, limit: 1 }.class(),
            ErrorClass::Client
        );
        assert_eq!(
            Error::InvalidSelection("x".into()).class(),
            ErrorClass::Client
        );
        assert_eq!(
            Error::Io(std::io::Error::other("disk")).class(),
            ErrorClass::Server
        );
    }
}
