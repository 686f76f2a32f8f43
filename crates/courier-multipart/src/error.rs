use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to access {path}: {source}")]
    Io {
        path:   PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("multipart boundary found inside parameter content")]
    BoundaryCollision,
}

impl Error {
    /// Recover a boundary collision reported through `std::io::Read`.
    pub fn is_collision(err: &io::Error) -> bool {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<Error>())
            .is_some_and(|e| matches!(e, Error::BoundaryCollision))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
