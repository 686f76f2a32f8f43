use std::fs;
use std::path::{Path, PathBuf};

use crate::{Error, Result, place};

/// A file written beside its target and moved into place on [`commit`].
///
/// Dropping an uncommitted `StagedFile` removes the staging file, so a
/// failed write never leaves partial content at the target path.
///
/// [`commit`]: StagedFile::commit
#[derive(Debug)]
pub struct StagedFile {
    staging:   PathBuf,
    target:    PathBuf,
    committed: bool,
}

impl StagedFile {
    /// Stage next to `target`, in the same directory.
    pub fn new(target: impl Into<PathBuf>) -> Result<Self> {
        let target = target.into();
        let parent = target
            .parent()
            .ok_or_else(|| Error::NoParent(target.clone()))?
            .to_path_buf();
        Self::in_dir(parent, target)
    }

    /// Stage inside `dir`, which may be on another filesystem than `target`.
    pub fn in_dir(dir: impl AsRef<Path>, target: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.as_ref();
        let target = target.into();
        fs::create_dir_all(dir).map_err(|source| Error::Write {
            path: dir.to_path_buf(),
            source,
        })?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "download".to_string());
        let staging = dir.join(format!(".{}.{}.part", name, uuid::Uuid::new_v4().simple()));

        Ok(Self {
            staging,
            target,
            committed: false,
        })
    }

    pub fn path(&self) -> &Path { &self.staging }

    pub fn target(&self) -> &Path { &self.target }

    /// Move the staged content to the target path.
    ///
    /// On failure the staging file is removed as well.
    pub fn commit(mut self) -> Result<PathBuf> {
        place(&self.staging, &self.target)?;
        self.committed = true;
        Ok(self.target.clone())
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        if !self.committed && self.staging.exists() {
            let _ = fs::remove_file(&self.staging);
        }
    }
}
