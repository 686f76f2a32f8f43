use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to write {path}: {source}")]
    Write {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to move {from} to {to}: {source}")]
    Move {
        from:   PathBuf,
        to:     PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove {path}: {source}")]
    Remove {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read metadata of {path}: {source}")]
    Metadata {
        path:   PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("path has no parent directory: {0}")]
    NoParent(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
