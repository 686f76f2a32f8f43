//! Effects layer: everything that touches the network.

pub mod mock;
#[cfg(feature = "reqwest")]
pub mod reqwest;
pub mod transport;

pub use mock::{MockResponse, MockTransport, RecordedRequest};
#[cfg(feature = "reqwest")]
pub use reqwest::ReqwestTransport;
pub use transport::{
    BoxStream, OutgoingBody, Transport, TransportError, TransportRequest, TransportResponse, TrustMode,
};
