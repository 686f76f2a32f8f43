use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

use courier_multipart::Parameter;

use super::queue::ExecutionQueue;
use crate::data::{EndpointDefinition, EndpointTable, HeaderList, TlsChallenge, TlsPolicy};
use crate::effects::Transport;
use crate::error::{Error, Result};
use crate::request::{Request, RequestConfig, RequestEnv, Target, TargetId};
use crate::sync::{read, write};
use crate::trust::{ChallengeHandler, TrustCache};

/// Settings applied to every request the manager creates, unless the
/// request sets its own.
#[derive(Clone, Default)]
pub struct RequestDefaults {
    pub timeout:           Option<Duration>,
    pub tls_policy:        TlsPolicy,
    pub challenge_handler: Option<Arc<dyn ChallengeHandler>>,
    pub headers:           HeaderList,
}

impl fmt::Debug for RequestDefaults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDefaults")
            .field("timeout", &self.timeout)
            .field("tls_policy", &self.tls_policy)
            .field("challenge_handler", &self.challenge_handler.is_some())
            .field("headers", &self.headers)
            .finish()
    }
}

struct Shared {
    endpoints:      RwLock<EndpointTable>,
    default_host:   RwLock<Option<String>>,
    host_overrides: RwLock<HashMap<String, String>>,
    /// Outstanding requests by target; untargeted ones under `None`.
    tracked:        RwLock<HashMap<Option<TargetId>, Vec<Request>>>,
    defaults:       RwLock<RequestDefaults>,
    queue:          ExecutionQueue,
    env:            RequestEnv,
}

/// Creates requests from endpoint definitions or explicit configuration,
/// runs them on bounded queues and tracks them for cancellation.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DispatchManager {
    shared: Arc<Shared>,
}

impl DispatchManager {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            shared: Arc::new(Shared {
                endpoints:      RwLock::new(EndpointTable::new()),
                default_host:   RwLock::new(None),
                host_overrides: RwLock::new(HashMap::new()),
                tracked:        RwLock::new(HashMap::new()),
                defaults:       RwLock::new(RequestDefaults::default()),
                queue:          ExecutionQueue::new("default"),
                env:            RequestEnv {
                    transport,
                    trust: Arc::new(TrustCache::new()),
                },
            }),
        }
    }

    #[must_use]
    pub fn with_endpoints(self, endpoints: EndpointTable) -> Self {
        self.load_endpoints(endpoints);
        self
    }

    #[must_use]
    pub fn with_default_host(self, host: impl Into<String>) -> Self {
        self.set_default_host(Some(host.into()));
        self
    }

    pub fn transport(&self) -> &Arc<dyn Transport> { &self.shared.env.transport }

    // -- endpoints and hosts ------------------------------------------------

    /// Add every definition of `endpoints`, replacing same-named ones.
    pub fn load_endpoints(&self, endpoints: EndpointTable) {
        write(&self.shared.endpoints).extend(endpoints);
    }

    pub fn add_endpoint(&self, definition: EndpointDefinition) { write(&self.shared.endpoints).insert(definition); }

    pub fn endpoint(&self, key: &str) -> Option<EndpointDefinition> { read(&self.shared.endpoints).get(key).cloned() }

    pub fn default_host(&self) -> Option<String> { read(&self.shared.default_host).clone() }

    pub fn set_default_host(&self, host: Option<String>) { *write(&self.shared.default_host) = host; }

    /// Send the endpoints named by `keys` to `host` instead of the default
    /// host. Endpoints that pin their own host keep it.
    pub fn set_host<S: AsRef<str>>(&self, host: &str, keys: &[S]) {
        let mut overrides = write(&self.shared.host_overrides);
        for key in keys {
            overrides.insert(key.as_ref().to_string(), host.to_string());
        }
    }

    // -- defaults -------------------------------------------------------------

    pub fn defaults(&self) -> RequestDefaults { read(&self.shared.defaults).clone() }

    pub fn set_defaults(&self, defaults: RequestDefaults) { *write(&self.shared.defaults) = defaults; }

    pub fn set_default_timeout(&self, timeout: Option<Duration>) { write(&self.shared.defaults).timeout = timeout; }

    pub fn set_default_tls_policy(&self, policy: TlsPolicy, handler: Option<Arc<dyn ChallengeHandler>>) {
        let mut defaults = write(&self.shared.defaults);
        defaults.tls_policy = policy;
        defaults.challenge_handler = handler;
    }

    pub fn set_default_header(&self, name: &str, value: &str) { write(&self.shared.defaults).headers.set(name, value); }

    // -- request creation -----------------------------------------------------

    /// Build a request for the endpoint `key`. `values` fill the URL
    /// template's placeholders in order.
    ///
    /// Enqueued on the default queue when `enqueue` is set; otherwise the
    /// caller may adjust it and dispatch it later.
    pub fn make_request(
        &self,
        key: &str,
        target: Option<&Target>,
        values: &[String],
        parameters: Vec<Parameter>,
        enqueue: bool,
    ) -> Result<Request> {
        let mut definition = self.endpoint(key).ok_or_else(|| Error::UnknownEndpoint(key.to_string()))?;
        if !definition.has_own_host() {
            if let Some(host) = read(&self.shared.host_overrides).get(key) {
                definition.host = Some(host.clone());
            }
        }
        let url = definition.resolve_url(self.default_host().as_deref(), values)?;

        let config = RequestConfig {
            method: definition.method,
            url: Some(url),
            headers: definition.headers,
            parameters,
            body_type: definition.body_type,
            result_kind: definition.result_kind,
            success_hook: definition.success_hook,
            failure_hook: definition.failure_hook,
            ..RequestConfig::default()
        };

        let request = self.request(config, target)?;
        tracing::debug!(request_id = request.id(), endpoint = key, "request created");
        if enqueue {
            self.enqueue(&request);
        }
        Ok(request)
    }

    /// A request from explicit configuration, sharing the manager's
    /// transport, defaults and trust cache. Not enqueued.
    pub fn request(&self, mut config: RequestConfig, target: Option<&Target>) -> Result<Request> {
        config.validate()?;
        let defaults = self.defaults();
        let mut headers = defaults.headers.clone();
        headers.merge(&config.headers);
        config.headers = headers;
        if config.timeout.is_none() {
            config.timeout = defaults.timeout;
        }
        if config.tls_policy == TlsPolicy::default() && config.challenge_handler.is_none() {
            config.tls_policy = defaults.tls_policy;
        }
        if config.challenge_handler.is_none() {
            config.challenge_handler = defaults.challenge_handler;
        }

        let request = Request::with_env(config, self.shared.env.clone(), target.cloned());
        self.track(&request);
        Ok(request)
    }

    fn track(&self, request: &Request) {
        let key = request.target().map(Target::id);
        write(&self.shared.tracked).entry(key).or_default().push(request.clone());

        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        request.on_complete(move |request, _| {
            let Some(shared) = shared.upgrade() else {
                return;
            };
            let mut tracked = write(&shared.tracked);
            if let Some(list) = tracked.get_mut(&key) {
                list.retain(|r| !r.ptr_eq(request));
                if list.is_empty() {
                    tracked.remove(&key);
                }
            }
        });
    }

    // -- execution ------------------------------------------------------------

    pub fn queue(&self) -> &ExecutionQueue { &self.shared.queue }

    /// Submit to the default queue.
    pub fn enqueue(&self, request: &Request) -> bool { self.shared.queue.submit(request) }

    pub fn enqueue_in(&self, request: &Request, queue: &ExecutionQueue) -> bool { queue.submit(request) }

    /// `None` removes the bound.
    pub fn set_maximum_concurrent_requests(&self, limit: Option<usize>) { self.shared.queue.set_limit(limit); }

    pub fn maximum_concurrent_requests(&self) -> Option<usize> { self.shared.queue.limit() }

    /// Outstanding requests made for `target`.
    pub fn tracked_count(&self, target: TargetId) -> usize {
        read(&self.shared.tracked).get(&Some(target)).map_or(0, Vec::len)
    }

    pub fn requests_for_target(&self, target: TargetId) -> Vec<Request> {
        read(&self.shared.tracked).get(&Some(target)).cloned().unwrap_or_default()
    }

    pub fn cancel_requests_for_target(&self, target: TargetId) {
        let requests = write(&self.shared.tracked).remove(&Some(target)).unwrap_or_default();
        tracing::debug!(?target, count = requests.len(), "cancelling requests for target");
        for request in requests {
            request.cancel();
        }
    }

    pub fn cancel_all_requests(&self) {
        let tracked = std::mem::take(&mut *write(&self.shared.tracked));
        for request in tracked.into_values().flatten() {
            request.cancel();
        }
    }

    // -- trust cache ----------------------------------------------------------

    pub fn trust_cache(&self) -> &Arc<TrustCache> { &self.shared.env.trust }

    pub fn ssl_cache_permits(&self, challenge: &TlsChallenge) -> bool {
        self.shared.env.trust.permits(&challenge.fingerprint())
    }

    pub fn cache_allowed_challenge(&self, challenge: &TlsChallenge) {
        self.shared.env.trust.insert(challenge.fingerprint());
    }

    pub fn clear_ssl_cache(&self) { self.shared.env.trust.clear(); }
}

impl fmt::Debug for DispatchManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchManager")
            .field("endpoints", &read(&self.shared.endpoints).len())
            .field("default_host", &*read(&self.shared.default_host))
            .field("queue", &self.shared.queue)
            .finish_non_exhaustive()
    }
}
