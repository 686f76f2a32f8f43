use std::path::Path;

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Content type for a file part, derived from its extension.
pub fn content_type_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return DEFAULT_CONTENT_TYPE;
    };

    match ext.to_ascii_lowercase().as_str() {
        "txt" | "text" | "log" => "text/plain",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "csv" => "text/csv",
        "xml" => "application/xml",
        "json" => "application/json",
        "plist" => "application/x-plist",
        "js" => "application/javascript",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" | "tgz" => "application/gzip",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp3" => "audio/mpeg",
        "m4a" => "audio/mp4",
        "wav" => "audio/wav",
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_extensions() {
        assert_eq!(content_type_for_path(Path::new("a/b/photo.JPG")), "image/jpeg");
        assert_eq!(content_type_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(content_type_for_path(Path::new("data.json")), "application/json");
    }

    #[test]
    fn test_unknown_or_missing_extension() {
        assert_eq!(content_type_for_path(Path::new("blob.xyz")), DEFAULT_CONTENT_TYPE);
        assert_eq!(content_type_for_path(Path::new("Makefile")), DEFAULT_CONTENT_TYPE);
    }
}
