//! Data layer: immutable configuration and value types.

pub mod endpoint;
pub mod headers;
pub mod kind;
pub mod progress;
pub mod tls;

pub use endpoint::{EndpointDefinition, EndpointTable};
pub use headers::HeaderList;
pub use kind::{BodyType, Method, ResultKind};
pub use progress::ProgressObserver;
pub use tls::{TlsChallenge, TlsPolicy};
