use std::collections::HashSet;
use std::fmt;
use std::io;
use std::pin::Pin;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::{Stream, StreamExt};
use thiserror::Error;
use url::Url;

use crate::data::{HeaderList, Method, TlsChallenge};
use crate::error::Error;

pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// How the transport treats a certificate that fails CA validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustMode {
    /// Reject unless the chain fingerprint is in `accepted`.
    Verify { accepted: HashSet<String> },
    AcceptAll,
}

impl Default for TrustMode {
    fn default() -> Self { TrustMode::Verify { accepted: HashSet::new() } }
}

impl TrustMode {
    pub fn accepting(fingerprints: impl IntoIterator<Item = String>) -> Self {
        TrustMode::Verify {
            accepted: fingerprints.into_iter().collect(),
        }
    }

    pub fn accepts(&self, fingerprint: &str) -> bool {
        match self {
            TrustMode::AcceptAll => true,
            TrustMode::Verify { accepted } => accepted.contains(fingerprint),
        }
    }
}

/// A request body as handed to the transport.
pub enum OutgoingBody {
    Empty,
    Bytes(Bytes),
    /// A streamed body of known length, sent with an explicit
    /// `Content-Length`.
    Stream {
        length: u64,
        stream: BoxStream<'static, io::Result<Bytes>>,
    },
}

impl OutgoingBody {
    pub fn len(&self) -> u64 {
        match self {
            OutgoingBody::Empty => 0,
            OutgoingBody::Bytes(b) => b.len() as u64,
            OutgoingBody::Stream { length, .. } => *length,
        }
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Drain the body into memory.
    pub async fn collect(self) -> io::Result<Bytes> {
        match self {
            OutgoingBody::Empty => Ok(Bytes::new()),
            OutgoingBody::Bytes(b) => Ok(b),
            OutgoingBody::Stream { mut stream, length } => {
                let mut buf = BytesMut::with_capacity(usize::try_from(length).unwrap_or(0));
                while let Some(chunk) = stream.next().await {
                    buf.extend_from_slice(&chunk?);
                }
                Ok(buf.freeze())
            }
        }
    }
}

impl fmt::Debug for OutgoingBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutgoingBody::Empty => f.write_str("Empty"),
            OutgoingBody::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            OutgoingBody::Stream { length, .. } => f.debug_struct("Stream").field("length", length).finish(),
        }
    }
}

/// One HTTP exchange, fully resolved.
#[derive(Debug)]
pub struct TransportRequest {
    pub method:  Method,
    pub url:     Url,
    pub headers: HeaderList,
    pub body:    OutgoingBody,
    pub trust:   TrustMode,
}

impl TransportRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderList::new(),
            body: OutgoingBody::Empty,
            trust: TrustMode::default(),
        }
    }
}

/// Response head plus a streamed body. Redirects have already been
/// followed; `url` is where the response actually came from.
pub struct TransportResponse {
    pub status:         u16,
    pub headers:        HeaderList,
    pub url:            Url,
    pub content_length: Option<u64>,
    pub body:           BoxStream<'static, Result<Bytes, TransportError>>,
}

impl TransportResponse {
    pub async fn bytes(mut self) -> Result<Bytes, TransportError> {
        let mut buf = BytesMut::new();
        while let Some(chunk) = self.body.next().await {
            buf.extend_from_slice(&chunk?);
        }
        Ok(buf.freeze())
    }
}

impl fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .field("url", &self.url.as_str())
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("timed out")]
    Timeout,
    #[error("{0}")]
    Io(String),
    #[error("TLS failure: {0}")]
    Tls(String),
    /// The server presented a certificate chain that was not accepted. The
    /// exchange can be retried with its fingerprint in `TrustMode`.
    #[error("untrusted certificate for {}: {}", .0.host(), .0.reason())]
    Challenge(TlsChallenge),
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        match e {
            TransportError::Timeout => Error::Timeout,
            TransportError::Tls(msg) => Error::Tls(msg),
            TransportError::Challenge(c) => Error::Tls(format!("untrusted certificate for {}: {}", c.host(), c.reason())),
            TransportError::Connect(msg) | TransportError::Io(msg) => Error::Transport(msg),
        }
    }
}

/// Performs HTTP exchanges. Implementations follow redirects and report
/// untrusted certificates as `TransportError::Challenge`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trust_mode_accepts() {
        let mode = TrustMode::accepting(["abc".to_string()]);
        assert!(mode.accepts("abc"));
        assert!(!mode.accepts("def"));
        assert!(TrustMode::AcceptAll.accepts("def"));
    }

    #[tokio::test]
    async fn test_collect_stream_body() {
        let chunks = vec![Ok(Bytes::from_static(b"ab")), Ok(Bytes::from_static(b"cd"))];
        let body = OutgoingBody::Stream {
            length: 4,
            stream: Box::pin(futures_util::stream::iter(chunks)),
        };
        assert_eq!(body.len(), 4);
        assert_eq!(body.collect().await.unwrap(), Bytes::from_static(b"abcd"));
    }

    #[test]
    fn test_challenge_maps_to_tls_error() {
        let c = TlsChallenge::new("example.com", vec![], "UnknownIssuer");
        assert!(matches!(Error::from(TransportError::Challenge(c)), Error::Tls(_)));
        assert_eq!(Error::from(TransportError::Timeout), Error::Timeout);
    }
}
