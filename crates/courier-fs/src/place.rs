use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use crate::{Error, Result};

/// Name of the marker written into cache roots so backup tools skip them.
pub const CACHEDIR_TAG: &str = "CACHEDIR.TAG";

const CACHEDIR_TAG_CONTENT: &[u8] = b"Signature: 8a477f597d28d172789f06886806bc55\n\
# This file is a cache directory tag created by courier.\n\
# For information about cache directory tags see https://bford.info/cachedir/\n";

/// Move `source` to `destination`, creating the destination's parent.
///
/// Falls back to copy and remove when the two paths live on different
/// filesystems. An existing destination is replaced.
pub fn place(source: &Path, destination: &Path) -> Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| Error::NoParent(destination.to_path_buf()))?;
    fs::create_dir_all(parent).map_err(|source| Error::Write {
        path: parent.to_path_buf(),
        source,
    })?;

    match fs::rename(source, destination) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            tracing::debug!(from = %source.display(), to = %destination.display(), "cross-device move, copying");
            fs::copy(source, destination).map_err(|e| Error::Move {
                from:   source.to_path_buf(),
                to:     destination.to_path_buf(),
                source: e,
            })?;
            fs::remove_file(source).map_err(|e| Error::Remove {
                path:   source.to_path_buf(),
                source: e,
            })
        }
        Err(e) => Err(Error::Move {
            from:   source.to_path_buf(),
            to:     destination.to_path_buf(),
            source: e,
        }),
    }
}

/// Create `dir` (and parents) if needed and tag it as a cache directory.
pub fn ensure_cache_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| Error::Write {
        path: dir.to_path_buf(),
        source,
    })?;

    let tag = dir.join(CACHEDIR_TAG);
    if !tag.exists() {
        fs::write(&tag, CACHEDIR_TAG_CONTENT).map_err(|source| Error::Write { path: tag, source })?;
    }
    Ok(())
}

/// Remove a file, reporting whether anything was there.
pub fn remove_if_exists(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(Error::Remove {
            path: path.to_path_buf(),
            source,
        }),
    }
}

pub fn file_len(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|source| Error::Metadata {
            path: path.to_path_buf(),
            source,
        })
}
