use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier_multipart::Parameter;
use url::Url;

use crate::core::QueryEncoding;
use crate::data::{BodyType, HeaderList, Method, ResultKind, TlsPolicy};
use crate::error::{Error, Result};
use crate::trust::ChallengeHandler;

/// An explicit request body. Mutually exclusive with body-forming
/// parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Bytes { data: Bytes, content_type: Option<String> },
    Json(serde_json::Value),
    /// Streamed from disk.
    File(PathBuf),
}

impl Body {
    pub fn bytes(data: impl Into<Bytes>) -> Self {
        Body::Bytes {
            data:         data.into(),
            content_type: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Body::Bytes {
            data:         Bytes::from(text.into()),
            content_type: Some("text/plain; charset=utf-8".to_string()),
        }
    }
}

/// Everything that describes one exchange before it is dispatched.
#[derive(Clone)]
pub struct RequestConfig {
    pub method:                    Method,
    pub url:                       Option<Url>,
    pub headers:                   HeaderList,
    pub parameters:                Vec<Parameter>,
    pub body:                      Option<Body>,
    /// How parameters become a body on methods that carry one.
    pub body_type:                 BodyType,
    pub result_kind:               ResultKind,
    pub query_encoding:            QueryEncoding,
    pub timeout:                   Option<Duration>,
    /// Stream the response to this path instead of memory.
    pub target_file:               Option<PathBuf>,
    /// Assemble the target file elsewhere and move it into place on
    /// success.
    pub copy_to_target_atomically: bool,
    pub tls_policy:                TlsPolicy,
    pub challenge_handler:         Option<Arc<dyn ChallengeHandler>>,
    pub success_hook:              Option<String>,
    pub failure_hook:              Option<String>,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            method:                    Method::Get,
            url:                       None,
            headers:                   HeaderList::new(),
            parameters:                Vec::new(),
            body:                      None,
            body_type:                 BodyType::default(),
            result_kind:               ResultKind::default(),
            query_encoding:            QueryEncoding::default(),
            timeout:                   None,
            target_file:               None,
            copy_to_target_atomically: true,
            tls_policy:                TlsPolicy::default(),
            challenge_handler:         None,
            success_hook:              None,
            failure_hook:              None,
        }
    }
}

impl RequestConfig {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url: Some(url),
            ..Self::default()
        }
    }

    pub fn get(url: Url) -> Self { Self::new(Method::Get, url) }

    pub fn post(url: Url) -> Self { Self::new(Method::Post, url) }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    #[must_use]
    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    #[must_use]
    pub fn parameters(mut self, parameters: impl IntoIterator<Item = Parameter>) -> Self {
        self.parameters.extend(parameters);
        self
    }

    #[must_use]
    pub fn body(mut self, body: Body) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    #[must_use]
    pub fn expect(mut self, kind: ResultKind) -> Self {
        self.result_kind = kind;
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn target_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_file = Some(path.into());
        self
    }

    #[must_use]
    pub fn atomic(mut self, atomic: bool) -> Self {
        self.copy_to_target_atomically = atomic;
        self
    }

    #[must_use]
    pub fn tls(mut self, policy: TlsPolicy, handler: Option<Arc<dyn ChallengeHandler>>) -> Self {
        self.tls_policy = policy;
        self.challenge_handler = handler;
        self
    }

    /// Accept any certificate.
    #[must_use]
    pub fn ignore_tls_validity(self) -> Self { self.tls(TlsPolicy::TrustAll, None) }

    #[must_use]
    pub fn query_encoding(mut self, encoding: QueryEncoding) -> Self {
        self.query_encoding = encoding;
        self
    }

    /// Reject configurations that cannot be sent: no URL, a body on a
    /// GET or HEAD, or an explicit body alongside body-forming parameters.
    pub fn validate(&self) -> Result<()> {
        if self.url.is_none() {
            return Err(Error::config("request has no url"));
        }
        if matches!(self.method, Method::Get | Method::Head) && self.body.is_some() {
            return Err(Error::config(format!("{} requests cannot carry a body", self.method)));
        }
        if !self.method.uses_query() && self.body.is_some() && !self.parameters.is_empty() {
            return Err(Error::config("request has both an explicit body and body parameters"));
        }
        Ok(())
    }
}

impl fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("url", &self.url.as_ref().map(Url::as_str))
            .field("headers", &self.headers)
            .field("parameters", &self.parameters.len())
            .field("body", &self.body)
            .field("result_kind", &self.result_kind)
            .field("timeout", &self.timeout)
            .field("target_file", &self.target_file)
            .field("tls_policy", &self.tls_policy)
            .finish_non_exhaustive()
    }
}
