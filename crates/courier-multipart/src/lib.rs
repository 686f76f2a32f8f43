//! Typed request parameters and a pull-based `multipart/form-data` encoder.
//!
//! [`MultipartStream`] never holds the whole body: in-memory values are
//! emitted from their buffers and file values are read from disk chunk by
//! chunk. Its [`content_length`](MultipartStream::content_length) is known
//! before the first byte is produced and always equals the number of bytes
//! the stream yields.

mod error;
mod mime;
mod param;
mod stream;

pub use error::{Error, Result};
pub use mime::content_type_for_path;
pub use param::{Parameter, ParameterKind, ParameterValue};
pub use stream::{MultipartStream, Stage};
