//! Error types for courier.

use std::path::PathBuf;

use thiserror::Error;

/// Every way a request or transfer can end without a converted result.
///
/// The enum is `Clone` because one terminal outcome is delivered to every
/// caller attached to a coalesced transfer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    #[error("invalid request configuration: {0}")]
    Configuration(String),

    #[error("no endpoint registered for key `{0}`")]
    UnknownEndpoint(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out")]
    Timeout,

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    #[error("failed to convert response body: {0}")]
    Conversion(String),

    #[error("multipart boundary found inside parameter content")]
    BoundaryCollision,

    #[error("request cancelled")]
    Cancelled,

    #[error("downloaded file could not be placed at {path}: {message}")]
    CacheWrite { path: PathBuf, message: String },

    #[error("file I/O error: {0}")]
    Io(String),
}

impl Error {
    pub fn is_cancelled(&self) -> bool { matches!(self, Error::Cancelled) }

    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status } => Some(*status),
            _ => None,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self { Error::Configuration(msg.into()) }
}

impl From<courier_multipart::Error> for Error {
    fn from(e: courier_multipart::Error) -> Self {
        match e {
            courier_multipart::Error::BoundaryCollision => Error::BoundaryCollision,
            other => Error::Io(other.to_string()),
        }
    }
}

impl From<courier_fs::Error> for Error {
    fn from(e: courier_fs::Error) -> Self { Error::Io(e.to_string()) }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self { Error::Io(e.to_string()) }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_only_for_http_errors() {
        assert_eq!(Error::Http { status: 404 }.status(), Some(404));
        assert_eq!(Error::Timeout.status(), None);
    }

    #[test]
    fn test_multipart_collision_maps_to_boundary_error() {
        assert_eq!(Error::from(courier_multipart::Error::BoundaryCollision), Error::BoundaryCollision);
    }
}
