//! One HTTP exchange: configuration, lifecycle, completion and conversion.

mod body;
mod completion;
mod config;
mod exchange;
mod lifecycle;
mod response;

pub use completion::{Target, TargetHooks, TargetId};
pub use config::{Body, RequestConfig};
pub(crate) use lifecycle::RequestEnv;
pub use lifecycle::{Request, State};
pub use response::Response;
