use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::watch;

use super::completion::{Completion, Target};
use super::config::RequestConfig;
use super::response::Response;
use crate::data::{ProgressObserver, TlsPolicy};
use crate::effects::Transport;
use crate::error::{Error, Result};
use crate::sync::lock;
use crate::trust::{ChallengeHandler, TrustCache};

static NEXT_REQUEST: AtomicU64 = AtomicU64::new(1);

/// Where a request is in its lifecycle. The last three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Configured,
    Enqueued,
    Executing,
    Completed,
    Failed,
    Cancelled,
}

impl State {
    pub fn is_terminal(&self) -> bool { matches!(self, State::Completed | State::Failed | State::Cancelled) }
}

/// Collaborators a request talks to while executing.
#[derive(Clone)]
pub(crate) struct RequestEnv {
    pub transport: Arc<dyn Transport>,
    pub trust:     Arc<TrustCache>,
}

#[derive(Default)]
struct Progress {
    observers: Vec<Arc<dyn ProgressObserver>>,
    last:      Option<f32>,
}

struct Inner {
    id:          u64,
    env:         RequestEnv,
    target:      Option<Target>,
    config:      Mutex<RequestConfig>,
    state:       watch::Sender<State>,
    response:    OnceLock<Response>,
    completions: Mutex<Vec<Completion>>,
    progress:    Mutex<Progress>,
}

/// Handle to one HTTP exchange. Clones share the same request.
///
/// The configuration may change until the request is enqueued or started.
/// The request then resolves exactly once, and every completion listener
/// runs exactly once with that outcome.
#[derive(Clone)]
pub struct Request {
    inner: Arc<Inner>,
}

impl Request {
    /// A standalone request with its own trust cache.
    pub fn new(config: RequestConfig, transport: Arc<dyn Transport>) -> Self {
        Self::with_env(config, RequestEnv {
            transport,
            trust: Arc::default(),
        }, None)
    }

    pub(crate) fn with_env(config: RequestConfig, env: RequestEnv, target: Option<Target>) -> Self {
        let (state, _) = watch::channel(State::Configured);
        Self {
            inner: Arc::new(Inner {
                id: NEXT_REQUEST.fetch_add(1, Ordering::Relaxed),
                env,
                target,
                config: Mutex::new(config),
                state,
                response: OnceLock::new(),
                completions: Mutex::new(Vec::new()),
                progress: Mutex::new(Progress::default()),
            }),
        }
    }

    pub fn id(&self) -> u64 { self.inner.id }

    pub fn state(&self) -> State { *self.inner.state.borrow() }

    pub fn target(&self) -> Option<&Target> { self.inner.target.as_ref() }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> RequestConfig { lock(&self.inner.config).clone() }

    /// Edit the configuration. Fails once the request has been dispatched,
    /// or when the edited configuration does not validate, in which case
    /// the previous configuration is kept.
    pub fn configure(&self, edit: impl FnOnce(&mut RequestConfig)) -> Result<()> {
        let mut config = lock(&self.inner.config);
        if self.state() != State::Configured {
            return Err(Error::config(format!("request {} has already been dispatched", self.id())));
        }
        let mut edited = config.clone();
        edit(&mut edited);
        edited.validate()?;
        *config = edited;
        Ok(())
    }

    pub fn set_header(&self, name: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.configure(|c| c.headers.set(name, value))
    }

    pub fn add_parameter(&self, parameter: courier_multipart::Parameter) -> Result<()> {
        self.configure(|c| c.parameters.push(parameter))
    }

    /// `handler` is only consulted by the prompting policies.
    pub fn set_tls_policy(&self, policy: TlsPolicy, handler: Option<Arc<dyn ChallengeHandler>>) -> Result<()> {
        self.configure(|c| {
            c.tls_policy = policy;
            c.challenge_handler = handler;
        })
    }

    /// Run `f` once with the terminal response. Runs immediately when the
    /// request has already finished.
    pub fn on_complete<F>(&self, f: F)
    where
        F: FnOnce(&Request, &Response) + Send + 'static,
    {
        let mut completions = lock(&self.inner.completions);
        match self.inner.response.get() {
            Some(response) => {
                drop(completions);
                f(self, response);
            }
            None => completions.push(Box::new(f)),
        }
    }

    /// Observe progress in `[0, 1]`; values never decrease.
    pub fn on_progress(&self, observer: impl ProgressObserver + 'static) {
        lock(&self.inner.progress).observers.push(Arc::new(observer));
    }

    pub fn is_finished(&self) -> bool { self.inner.response.get().is_some() }

    pub fn response(&self) -> Option<&Response> { self.inner.response.get() }

    /// Wait for the terminal response.
    pub async fn finished(&self) -> Response {
        let mut state = self.inner.state.subscribe();
        loop {
            if let Some(response) = self.inner.response.get() {
                return response.clone();
            }
            // The sender lives in `self`, so the channel cannot close here.
            if state.wait_for(State::is_terminal).await.is_err() {
                return Response::cancelled();
            }
        }
    }

    /// Begin the exchange outside any queue. Returns `false` if the
    /// request was already started or has finished.
    pub fn start(&self) -> bool {
        if !self.begin() {
            return false;
        }
        tokio::spawn(self.clone().run());
        true
    }

    /// Cancel the request. The first call resolves it with
    /// `Error::Cancelled`; later calls, or calls after completion, do
    /// nothing.
    pub fn cancel(&self) {
        if !self.is_finished() {
            tracing::debug!(request_id = self.id(), "cancelling request");
        }
        self.finish(Response::cancelled());
    }

    pub fn ptr_eq(&self, other: &Request) -> bool { Arc::ptr_eq(&self.inner, &other.inner) }

    pub(crate) fn env(&self) -> &RequestEnv { &self.inner.env }

    pub(crate) fn mark_enqueued(&self) -> bool {
        self.inner.state.send_if_modified(|s| {
            if *s == State::Configured {
                *s = State::Enqueued;
                true
            } else {
                false
            }
        })
    }

    pub(crate) fn begin(&self) -> bool {
        let response = &self.inner.response;
        self.inner.state.send_if_modified(|s| {
            if matches!(s, State::Configured | State::Enqueued) && response.get().is_none() {
                *s = State::Executing;
                true
            } else {
                false
            }
        })
    }

    pub(crate) async fn wait_terminal(&self) {
        let mut state = self.inner.state.subscribe();
        let _ = state.wait_for(State::is_terminal).await;
    }

    /// Execute until the exchange resolves or the request is finished from
    /// elsewhere (cancel), whichever comes first.
    pub(crate) async fn run(self) {
        tokio::select! {
            response = self.exchange() => self.finish(response),
            () = self.wait_terminal() => {}
        }
    }

    pub(crate) fn report_progress(&self, value: f32) {
        let value = value.clamp(0.0, 1.0);
        let observers = {
            let mut progress = lock(&self.inner.progress);
            if progress.last.is_some_and(|last| value <= last) {
                return;
            }
            progress.last = Some(value);
            progress.observers.clone()
        };
        tracing::trace!(request_id = self.id(), progress = value);
        for observer in observers {
            observer.on_progress(value);
        }
    }

    pub(crate) fn finish(&self, response: Response) {
        if self.inner.response.set(response).is_err() {
            return;
        }
        let Some(response) = self.inner.response.get() else {
            return;
        };
        if response.is_success() {
            self.report_progress(1.0);
        }
        let terminal = match response.error() {
            None => State::Completed,
            Some(Error::Cancelled) => State::Cancelled,
            Some(_) => State::Failed,
        };
        self.inner.state.send_replace(terminal);
        tracing::debug!(request_id = self.id(), state = ?terminal, status = ?response.status(), "request finished");

        let completions = std::mem::take(&mut *lock(&self.inner.completions));
        for completion in completions {
            completion(self, response);
        }

        let Some(hooks) = self.target().and_then(Target::hooks) else {
            return;
        };
        let (success, failure) = {
            let config = lock(&self.inner.config);
            (config.success_hook.clone(), config.failure_hook.clone())
        };
        match response.error() {
            None => {
                if let Some(name) = success {
                    hooks.on_success(&name, self, response);
                }
            }
            // A cancelled target is going away; it is not called back.
            Some(Error::Cancelled) => {}
            Some(_) => {
                if let Some(name) = failure {
                    hooks.on_failure(&name, self, response);
                }
            }
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
