//! Pure transformations: no I/O happens in this layer.

pub mod convert;
pub mod query;
pub mod status;
pub mod template;

pub use convert::{Converted, convert};
pub use query::{QueryEncoding, append_query, form_body, query_string};
pub use status::{is_error_status, is_redirect};
pub use template::substitute;
