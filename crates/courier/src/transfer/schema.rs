use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use url::Url;

/// Maps remote resources to local cache files.
pub trait CacheSchema: Send + Sync {
    fn cache_path_for_url(&self, url: &Url) -> PathBuf;

    /// Path for an explicit cache name instead of a URL.
    fn cache_path_for_name(&self, name: &str) -> PathBuf;

    fn cache_dir(&self) -> &Path;
}

/// Content addressed names under one root: the SHA-256 of the URL plus the
/// URL's file extension, so cached files keep a usable type.
#[derive(Debug, Clone)]
pub struct FileCacheSchema {
    root: PathBuf,
}

impl FileCacheSchema {
    pub fn new(root: impl Into<PathBuf>) -> Self { Self { root: root.into() } }

    /// `courier` under the system temp directory.
    pub fn in_temp_dir() -> Self { Self::new(std::env::temp_dir().join("courier")) }
}

fn extension(url: &Url) -> Option<&str> {
    let segment = url.path_segments()?.next_back()?;
    let (_, ext) = segment.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric())).then_some(ext)
}

impl CacheSchema for FileCacheSchema {
    fn cache_path_for_url(&self, url: &Url) -> PathBuf {
        let digest = hex::encode(Sha256::digest(url.as_str().as_bytes()));
        let name = match extension(url) {
            Some(ext) => format!("{digest}.{}", ext.to_ascii_lowercase()),
            None => digest,
        };
        self.root.join(name)
    }

    fn cache_path_for_name(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':' | '\0') { '_' } else { c })
            .collect();
        let safe = match safe.trim_start_matches('.') {
            "" => "_".to_string(),
            rest => rest.to_string(),
        };
        self.root.join(safe)
    }

    fn cache_dir(&self) -> &Path { &self.root }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_paths_are_stable_and_keep_extension() {
        let schema = FileCacheSchema::new("/cache");
        let url = Url::parse("https://cdn.test/images/Logo.PNG?v=2").unwrap();
        let a = schema.cache_path_for_url(&url);
        assert_eq!(a, schema.cache_path_for_url(&url));
        assert_eq!(a.extension().unwrap(), "png");
        assert_eq!(a.parent().unwrap(), Path::new("/cache"));

        let other = Url::parse("https://cdn.test/images/Logo.PNG?v=3").unwrap();
        assert_ne!(a, schema.cache_path_for_url(&other));
    }

    #[test]
    fn test_no_extension() {
        let schema = FileCacheSchema::new("/cache");
        let path = schema.cache_path_for_url(&Url::parse("https://api.test/feed").unwrap());
        assert_eq!(path.file_name().unwrap().len(), 64);
    }

    #[test]
    fn test_names_cannot_escape_root() {
        let schema = FileCacheSchema::new("/cache");
        assert_eq!(schema.cache_path_for_name("../etc/passwd"), PathBuf::from("/cache/_etc_passwd"));
        assert_eq!(schema.cache_path_for_name("avatar.jpg"), PathBuf::from("/cache/avatar.jpg"));
    }
}
