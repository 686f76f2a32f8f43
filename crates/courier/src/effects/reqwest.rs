//! Production transport on reqwest with a rustls verifier that reports
//! rejected chains as challenges.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use rustls::client::WebPkiServerVerifier;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use url::Url;

use super::transport::{OutgoingBody, Transport, TransportError, TransportRequest, TransportResponse, TrustMode};
use crate::data::{HeaderList, Method, TlsChallenge};
use crate::sync::lock;

const MAX_REDIRECTS: usize = 10;

type ChallengeSlot = Arc<Mutex<Option<TlsChallenge>>>;

#[derive(Debug)]
struct ChallengeVerifier {
    inner:    Arc<WebPkiServerVerifier>,
    trust:    TrustMode,
    captured: ChallengeSlot,
}

impl ServerCertVerifier for ChallengeVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        if self.trust == TrustMode::AcceptAll {
            return Ok(ServerCertVerified::assertion());
        }
        match self.inner.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now) {
            Err(rustls::Error::InvalidCertificate(reason)) => {
                let mut chain = vec![Bytes::copy_from_slice(end_entity.as_ref())];
                chain.extend(intermediates.iter().map(|c| Bytes::copy_from_slice(c.as_ref())));
                let challenge = TlsChallenge::new(server_name.to_str(), chain, format!("{reason:?}"));
                if self.trust.accepts(&challenge.fingerprint()) {
                    return Ok(ServerCertVerified::assertion());
                }
                *lock(&self.captured) = Some(challenge);
                Err(rustls::Error::InvalidCertificate(reason))
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> { self.inner.supported_verify_schemes() }
}

/// HTTP transport on reqwest.
///
/// A client is built per exchange because the certificate verifier
/// carries the exchange's trust mode.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    provider:        Arc<CryptoProvider>,
    roots:           Arc<RootCertStore>,
    proxies:         Vec<Url>,
    connect_timeout: Option<Duration>,
}

impl Default for ReqwestTransport {
    fn default() -> Self { Self::new() }
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            provider:        Arc::new(rustls::crypto::ring::default_provider()),
            roots:           Arc::new(RootCertStore {
                roots: webpki_roots::TLS_SERVER_ROOTS.to_vec(),
            }),
            proxies:         Vec::new(),
            connect_timeout: None,
        }
    }

    /// Route traffic through `proxies`. `https` proxies carry TLS
    /// traffic, the rest plain HTTP.
    #[must_use]
    pub fn with_proxies(mut self, proxies: Vec<Url>) -> Self {
        self.proxies = proxies;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    fn client(&self, trust: TrustMode, captured: ChallengeSlot) -> Result<reqwest::Client, TransportError> {
        let inner = WebPkiServerVerifier::builder_with_provider(self.roots.clone(), self.provider.clone())
            .build()
            .map_err(|e| TransportError::Tls(e.to_string()))?;
        let verifier = ChallengeVerifier { inner, trust, captured };
        let tls = ClientConfig::builder_with_provider(self.provider.clone())
            .with_safe_default_protocol_versions()
            .map_err(|e| TransportError::Tls(e.to_string()))?
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(verifier))
            .with_no_client_auth();

        let mut builder = reqwest::Client::builder()
            .use_preconfigured_tls(tls)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS));
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let (secure, plain): (Vec<&Url>, Vec<&Url>) = self.proxies.iter().partition(|u| u.scheme() == "https");
        for u in secure {
            let proxy = reqwest::Proxy::https(u.as_str())
                .map_err(|e| TransportError::Connect(format!("invalid proxy {u}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        for u in plain {
            let proxy = reqwest::Proxy::http(u.as_str())
                .map_err(|e| TransportError::Connect(format!("invalid proxy {u}: {e}")))?;
            builder = builder.proxy(proxy);
        }
        builder.build().map_err(|e| TransportError::Tls(e.to_string()))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
        Method::Head => reqwest::Method::HEAD,
        Method::Options => reqwest::Method::OPTIONS,
    }
}

fn map_error(err: reqwest::Error, captured: &ChallengeSlot) -> TransportError {
    if let Some(challenge) = lock(captured).take() {
        return TransportError::Challenge(challenge);
    }
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Io(err.to_string())
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        let captured = ChallengeSlot::default();
        let client = self.client(request.trust, captured.clone())?;

        let mut builder = client.request(to_reqwest_method(request.method), request.url);
        for (name, value) in request.headers.iter() {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            OutgoingBody::Empty => builder,
            OutgoingBody::Bytes(bytes) => builder.body(bytes),
            OutgoingBody::Stream { length, stream } => builder
                .header(reqwest::header::CONTENT_LENGTH, length)
                .body(reqwest::Body::wrap_stream(stream)),
        };

        let response = builder.send().await.map_err(|e| map_error(e, &captured))?;

        let mut headers = HeaderList::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.append(name.as_str(), value);
            }
        }
        let status = response.status().as_u16();
        let url = response.url().clone();
        let content_length = response.content_length();
        tracing::debug!(%url, status, "response received");

        let body = response.bytes_stream().map(move |chunk| chunk.map_err(|e| map_error(e, &captured)));
        Ok(TransportResponse {
            status,
            headers,
            url,
            content_length,
            body: Box::pin(body),
        })
    }
}
