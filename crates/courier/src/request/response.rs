use std::path::{Path, PathBuf};

use bytes::Bytes;
use url::Url;

use crate::core::Converted;
use crate::data::HeaderList;
use crate::error::{Error, Result};

/// The terminal outcome of a request.
///
/// `result` holds either the converted body or the error that ended the
/// request, never both. On an HTTP error the body is still decoded into
/// `error_payload` when possible.
#[derive(Debug, Clone)]
pub struct Response {
    pub(crate) result:         Result<Converted>,
    pub(crate) error_payload:  Option<Converted>,
    pub(crate) status:         Option<u16>,
    pub(crate) headers:        HeaderList,
    pub(crate) redirected_url: Option<Url>,
    pub(crate) data:           Option<Bytes>,
    pub(crate) file:           Option<PathBuf>,
}

impl Response {
    pub(crate) fn failed(error: Error) -> Self {
        Self {
            result:         Err(error),
            error_payload:  None,
            status:         None,
            headers:        HeaderList::new(),
            redirected_url: None,
            data:           None,
            file:           None,
        }
    }

    pub(crate) fn cancelled() -> Self { Self::failed(Error::Cancelled) }

    pub fn result(&self) -> std::result::Result<&Converted, &Error> { self.result.as_ref() }

    pub fn into_result(self) -> Result<Converted> { self.result }

    pub fn is_success(&self) -> bool { self.result.is_ok() }

    pub fn converted(&self) -> Option<&Converted> { self.result.as_ref().ok() }

    pub fn error(&self) -> Option<&Error> { self.result.as_ref().err() }

    pub fn is_cancelled(&self) -> bool { self.error().is_some_and(Error::is_cancelled) }

    /// Body of an HTTP error response, decoded as the expected kind.
    pub fn error_payload(&self) -> Option<&Converted> { self.error_payload.as_ref() }

    /// `None` when no response head was received.
    pub fn status(&self) -> Option<u16> { self.status }

    pub fn headers(&self) -> &HeaderList { &self.headers }

    /// Final URL, set only when a redirect was followed.
    pub fn redirected_url(&self) -> Option<&Url> { self.redirected_url.as_ref() }

    /// Raw body bytes, unless the body was streamed to a file.
    pub fn data(&self) -> Option<&Bytes> { self.data.as_ref() }

    /// Where the body was written, for target-file requests.
    pub fn file(&self) -> Option<&Path> { self.file.as_deref() }
}
