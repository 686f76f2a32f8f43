/// Returns `true` if the HTTP status code indicates a redirect.
///
/// # Recognized Redirect Codes
///
/// - 301: Moved Permanently
/// - 302: Found
/// - 303: See Other
/// - 307: Temporary Redirect
/// - 308: Permanent Redirect
pub fn is_redirect(status: u16) -> bool { matches!(status, 301 | 302 | 303 | 307 | 308) }

/// Status codes that fail a request even when the body converts.
pub fn is_error_status(status: u16) -> bool { status >= 400 }
