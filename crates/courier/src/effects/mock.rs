//! In-memory transport used by the test suite and by embedders that want to
//! exercise request flows without a network.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use url::Url;

use super::transport::{Transport, TransportError, TransportRequest, TransportResponse};
use crate::core::is_redirect;
use crate::data::{HeaderList, Method, TlsChallenge};
use crate::sync::lock;

const MAX_REDIRECTS: usize = 10;
const DEFAULT_CHUNK: usize = 16 * 1024;

/// A canned response.
#[derive(Debug, Clone)]
pub struct MockResponse {
    status:     u16,
    headers:    HeaderList,
    body:       Bytes,
    delay:      Duration,
    chunk_size: usize,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderList::new(),
            body: body.into(),
            delay: Duration::ZERO,
            chunk_size: DEFAULT_CHUNK,
        }
    }

    pub fn ok(body: impl Into<Bytes>) -> Self { Self::new(200, body) }

    pub fn json(value: &serde_json::Value) -> Self {
        Self::ok(value.to_string()).header("Content-Type", "application/json")
    }

    pub fn status(status: u16) -> Self { Self::new(status, Bytes::new()) }

    pub fn redirect(status: u16, location: &str) -> Self { Self::status(status).header("Location", location) }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    /// Hold the response back for `delay` after the request arrives.
    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }
}

#[derive(Debug, Clone)]
enum Route {
    Respond(MockResponse),
    Fail(TransportError),
}

/// A request as the mock received it, body drained.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method:  Method,
    pub url:     Url,
    pub headers: HeaderList,
    pub body:    Bytes,
}

/// Routes are matched on method and full URL first, then on method and
/// the URL without its query. `HEAD` falls back to the `GET` route with
/// the body removed.
#[derive(Debug, Default)]
pub struct MockTransport {
    routes:    Mutex<HashMap<(Method, String), Route>>,
    untrusted: Mutex<HashMap<String, Vec<Bytes>>>,
    recorded:  Mutex<Vec<RecordedRequest>>,
    calls:     AtomicUsize,
    in_flight: AtomicUsize,
    peak:      AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) { self.0.fetch_sub(1, Ordering::SeqCst); }
}

impl MockTransport {
    pub fn new() -> Self { Self::default() }

    /// Install or replace the route for `method url`.
    pub fn route(&self, method: Method, url: &str, response: MockResponse) -> &Self {
        lock(&self.routes).insert((method, url.to_string()), Route::Respond(response));
        self
    }

    pub fn fail(&self, method: Method, url: &str, error: TransportError) -> &Self {
        lock(&self.routes).insert((method, url.to_string()), Route::Fail(error));
        self
    }

    /// Make `host` present `chain`, which fails CA validation.
    pub fn untrusted_host(&self, host: &str, chain: Vec<Bytes>) -> &Self {
        lock(&self.untrusted).insert(host.to_ascii_lowercase(), chain);
        self
    }

    /// Number of exchanges started, including failed ones.
    pub fn calls(&self) -> usize { self.calls.load(Ordering::SeqCst) }

    /// Exchanges started for `method url`, ignoring the query.
    pub fn calls_to(&self, method: Method, url: &str) -> usize {
        lock(&self.recorded)
            .iter()
            .filter(|r| r.method == method && strip_query(&r.url) == url)
            .count()
    }

    /// Highest number of exchanges that were in progress at once.
    pub fn peak_in_flight(&self) -> usize { self.peak.load(Ordering::SeqCst) }

    pub fn requests(&self) -> Vec<RecordedRequest> { lock(&self.recorded).clone() }

    pub fn last_request(&self) -> Option<RecordedRequest> { lock(&self.recorded).last().cloned() }

    fn lookup(&self, method: Method, url: &Url) -> Option<Route> {
        let routes = lock(&self.routes);
        let direct = |m: Method| {
            routes
                .get(&(m, url.as_str().to_string()))
                .or_else(|| routes.get(&(m, strip_query(url))))
                .cloned()
        };
        direct(method).or_else(|| {
            if method != Method::Head {
                return None;
            }
            match direct(Method::Get)? {
                Route::Respond(mut r) => {
                    r.headers.set("Content-Length", r.body.len().to_string());
                    r.body = Bytes::new();
                    Some(Route::Respond(r))
                }
                fail => Some(fail),
            }
        })
    }

    fn check_trust(&self, request: &TransportRequest, url: &Url) -> Result<(), TransportError> {
        if url.scheme() != "https" {
            return Ok(());
        }
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        let Some(chain) = lock(&self.untrusted).get(&host).cloned() else {
            return Ok(());
        };
        let challenge = TlsChallenge::new(host, chain, "UnknownIssuer");
        if request.trust.accepts(&challenge.fingerprint()) {
            Ok(())
        } else {
            Err(TransportError::Challenge(challenge))
        }
    }
}

fn strip_query(url: &Url) -> String {
    let mut bare = url.clone();
    bare.set_query(None);
    bare.set_fragment(None);
    bare.to_string()
}

#[async_trait]
impl Transport for MockTransport {
    async fn execute(&self, mut request: TransportRequest) -> Result<TransportResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let body = std::mem::replace(&mut request.body, super::OutgoingBody::Empty)
            .collect()
            .await
            .map_err(|e| TransportError::Io(e.to_string()))?;
        lock(&self.recorded).push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body,
        });

        let mut method = request.method;
        let mut url = request.url.clone();
        for _ in 0..=MAX_REDIRECTS {
            self.check_trust(&request, &url)?;
            let response = match self.lookup(method, &url) {
                Some(Route::Respond(r)) => r,
                Some(Route::Fail(e)) => return Err(e),
                None => MockResponse::status(404),
            };
            if !response.delay.is_zero() {
                tokio::time::sleep(response.delay).await;
            }

            if is_redirect(response.status) {
                if let Some(location) = response.headers.get("location") {
                    url = url.join(location).map_err(|e| TransportError::Io(e.to_string()))?;
                    if response.status == 303 {
                        method = Method::Get;
                    }
                    continue;
                }
            }

            let content_length = if method == Method::Head {
                response.headers.get("content-length").and_then(|v| v.parse().ok())
            } else {
                Some(response.body.len() as u64)
            };
            let chunks: Vec<Result<Bytes, TransportError>> = response
                .body
                .chunks(response.chunk_size)
                .map(|c| Ok(Bytes::copy_from_slice(c)))
                .collect();
            return Ok(TransportResponse {
                status: response.status,
                headers: response.headers,
                url,
                content_length,
                body: Box::pin(futures_util::stream::iter(chunks)),
            });
        }
        Err(TransportError::Io(format!("too many redirects for {}", request.url)))
    }
}
