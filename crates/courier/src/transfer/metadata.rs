//! Validators remembered next to cached files for update checks.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::HeaderList;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMetadata {
    pub etag:           Option<String>,
    pub last_modified:  Option<String>,
    pub content_length: Option<u64>,
}

impl RemoteMetadata {
    pub fn from_headers(headers: &HeaderList) -> Self {
        Self {
            etag:           headers.get("etag").map(str::to_string),
            last_modified:  headers.get("last-modified").map(str::to_string),
            content_length: headers.get("content-length").and_then(|v| v.trim().parse().ok()),
        }
    }

    pub fn is_empty(&self) -> bool { self.etag.is_none() && self.last_modified.is_none() && self.content_length.is_none() }

    /// Compare the strongest validator both sides have: ETag, then
    /// Last-Modified, then Content-Length. Unknown means changed.
    pub fn is_unchanged(&self, remote: &RemoteMetadata) -> bool {
        if let (Some(local), Some(remote)) = (&self.etag, &remote.etag) {
            return local == remote;
        }
        if let (Some(local), Some(remote)) = (&self.last_modified, &remote.last_modified) {
            return local == remote;
        }
        if let (Some(local), Some(remote)) = (self.content_length, remote.content_length) {
            return local == remote;
        }
        false
    }

    pub fn sidecar_path(cached: &Path) -> PathBuf {
        let mut name = cached.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".meta.json");
        cached.with_file_name(name)
    }

    pub async fn load(cached: &Path) -> Option<Self> {
        let text = tokio::fs::read(Self::sidecar_path(cached)).await.ok()?;
        serde_json::from_slice(&text).ok()
    }

    pub async fn store(&self, cached: &Path) -> std::io::Result<()> {
        let encoded = serde_json::to_vec(self).map_err(std::io::Error::other)?;
        tokio::fs::write(Self::sidecar_path(cached), encoded).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(etag: Option<&str>, modified: Option<&str>, len: Option<u64>) -> RemoteMetadata {
        RemoteMetadata {
            etag:           etag.map(Into::into),
            last_modified:  modified.map(Into::into),
            content_length: len,
        }
    }

    #[test]
    fn test_etag_wins_over_weaker_validators() {
        let local = meta(Some("\"a\""), Some("Mon"), Some(10));
        assert!(!local.is_unchanged(&meta(Some("\"b\""), Some("Mon"), Some(10))));
        assert!(local.is_unchanged(&meta(Some("\"a\""), Some("Tue"), Some(11))));
    }

    #[test]
    fn test_falls_back_to_length_then_unknown() {
        assert!(meta(None, None, Some(3)).is_unchanged(&meta(None, None, Some(3))));
        assert!(!meta(None, None, None).is_unchanged(&meta(None, None, None)));
    }

    #[test]
    fn test_sidecar_name() {
        let path = RemoteMetadata::sidecar_path(Path::new("/cache/abc.png"));
        assert_eq!(path, PathBuf::from("/cache/abc.png.meta.json"));
    }

    #[tokio::test]
    async fn test_store_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let cached = dir.path().join("file.bin");
        let stored = meta(Some("\"v1\""), None, Some(5));
        stored.store(&cached).await.unwrap();
        assert_eq!(RemoteMetadata::load(&cached).await, Some(stored));
    }
}
