//! Filesystem primitives for transfers: staged files that only become
//! visible at their target path on commit, cross-device safe moves, and
//! cache directory creation.

mod error;
mod place;
mod staged;

pub use error::{Error, Result};
pub use place::{CACHEDIR_TAG, ensure_cache_dir, file_len, place, remove_if_exists};
pub use staged::StagedFile;
