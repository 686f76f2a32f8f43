use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use super::observers::ObserverSet;
use crate::data::ProgressObserver;
use crate::error::{Error, Result};
use crate::request::{Request, Response};
use crate::sync::lock;

pub type TransferCallback = Box<dyn FnOnce(&TransferOutcome) + Send>;
pub type UpdateCallback = Box<dyn FnOnce(&Path) + Send>;

/// How a download or upload ended. Shared by every caller attached to the
/// same transfer.
#[derive(Debug, Clone)]
pub struct TransferOutcome {
    result:     Result<PathBuf>,
    from_cache: bool,
    request:    Option<Request>,
    response:   Option<Response>,
}

impl TransferOutcome {
    pub(crate) fn new(result: Result<PathBuf>, request: Option<Request>) -> Self {
        let response = request.as_ref().and_then(|r| r.response().cloned());
        Self {
            result,
            from_cache: false,
            request,
            response,
        }
    }

    pub(crate) fn cached(path: PathBuf) -> Self {
        Self {
            result:     Ok(path),
            from_cache: true,
            request:    None,
            response:   None,
        }
    }

    pub(crate) fn into_cached(mut self) -> Self {
        self.from_cache = true;
        self
    }

    pub(crate) fn cancelled(request: Option<Request>) -> Self { Self::new(Err(Error::Cancelled), request) }

    /// The local file: the cached download, or the uploaded file.
    pub fn result(&self) -> std::result::Result<&Path, &Error> {
        match &self.result {
            Ok(path) => Ok(path),
            Err(e) => Err(e),
        }
    }

    pub fn path(&self) -> Option<&Path> { self.result().ok() }

    pub fn error(&self) -> Option<&Error> { self.result().err() }

    pub fn is_success(&self) -> bool { self.result.is_ok() }

    pub fn is_cancelled(&self) -> bool { self.error().is_some_and(Error::is_cancelled) }

    /// Served from the cache without a full download.
    pub fn from_cache(&self) -> bool { self.from_cache }

    /// The request that produced the outcome, if one ran.
    pub fn request(&self) -> Option<&Request> { self.request.as_ref() }

    pub fn response(&self) -> Option<&Response> { self.response.as_ref() }
}

/// One in-flight download or upload, shared by coalesced callers.
pub(crate) struct Transfer {
    label:       String,
    observers:   Mutex<ObserverSet>,
    completions: Mutex<Option<Vec<TransferCallback>>>,
    updates:     Mutex<Vec<UpdateCallback>>,
    request:     Mutex<Option<Request>>,
    cancelled:   AtomicBool,
}

impl Transfer {
    pub(crate) fn new(label: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            label:       label.into(),
            observers:   Mutex::new(ObserverSet::default()),
            completions: Mutex::new(Some(Vec::new())),
            updates:     Mutex::new(Vec::new()),
            request:     Mutex::new(None),
            cancelled:   AtomicBool::new(false),
        })
    }

    pub(crate) fn label(&self) -> &str { &self.label }

    pub(crate) fn add_observer(&self, observer: Arc<dyn ProgressObserver>) {
        let (guarded, last) = lock(&self.observers).add(observer);
        if let Some(value) = last {
            guarded.deliver(value);
        }
    }

    pub(crate) fn remove_observer(&self, observer: &Arc<dyn ProgressObserver>) -> bool {
        lock(&self.observers).remove(observer)
    }

    pub(crate) fn clear_observers(&self) { lock(&self.observers).clear(); }

    pub(crate) fn broadcast(&self, value: f32) {
        let Some(targets) = lock(&self.observers).update(value.clamp(0.0, 1.0)) else {
            return;
        };
        for guarded in targets {
            guarded.deliver(value);
        }
    }

    /// Returns the callback back if the transfer already resolved.
    pub(crate) fn add_completion(&self, callback: TransferCallback) -> Option<TransferCallback> {
        match lock(&self.completions).as_mut() {
            Some(pending) => {
                pending.push(callback);
                None
            }
            None => Some(callback),
        }
    }

    pub(crate) fn add_update_callback(&self, callback: UpdateCallback) { lock(&self.updates).push(callback); }

    pub(crate) fn take_update_callbacks(&self) -> Vec<UpdateCallback> { std::mem::take(&mut *lock(&self.updates)) }

    /// Make `request` the current network exchange. Refused, and the
    /// request cancelled, once the transfer has been cancelled.
    pub(crate) fn attach_request(&self, request: &Request) -> bool {
        let mut slot = lock(&self.request);
        if self.cancelled.load(Ordering::SeqCst) {
            request.cancel();
            return false;
        }
        *slot = Some(request.clone());
        true
    }

    pub(crate) fn current_request(&self) -> Option<Request> { lock(&self.request).clone() }

    pub(crate) fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }

    /// Cancel the current exchange and stop any further one from starting.
    pub(crate) fn cancel(&self) -> Option<Request> {
        let slot = lock(&self.request);
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(request) = slot.as_ref() {
            request.cancel();
        }
        slot.clone()
    }

    /// Deliver `outcome` to every attached caller. Only the first call has
    /// any effect.
    pub(crate) fn resolve(&self, outcome: TransferOutcome) {
        let Some(callbacks) = lock(&self.completions).take() else {
            return;
        };
        if outcome.is_success() {
            self.broadcast(1.0);
        }
        tracing::debug!(
            transfer = %self.label,
            success = outcome.is_success(),
            callers = callbacks.len(),
            "transfer resolved"
        );
        for callback in callbacks {
            callback(&outcome);
        }
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("label", &self.label)
            .field("observers", &lock(&self.observers).len())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
