use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{Request, Response};

static NEXT_TARGET: AtomicU64 = AtomicU64::new(1);

/// Identity used to group requests for cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u64);

/// Named completion hooks. The names come from the endpoint's
/// `successSelectorName` and `failureSelectorName`.
pub trait TargetHooks: Send + Sync {
    fn on_success(&self, hook: &str, request: &Request, response: &Response);

    fn on_failure(&self, hook: &str, request: &Request, response: &Response);
}

/// The caller a request works on behalf of.
///
/// Requests made for a target can be cancelled together, and report to its
/// hooks when it has any.
#[derive(Clone)]
pub struct Target {
    id:    TargetId,
    hooks: Option<Arc<dyn TargetHooks>>,
}

impl Target {
    pub fn new() -> Self {
        Self {
            id:    TargetId(NEXT_TARGET.fetch_add(1, Ordering::Relaxed)),
            hooks: None,
        }
    }

    pub fn with_hooks(hooks: Arc<dyn TargetHooks>) -> Self {
        Self {
            hooks: Some(hooks),
            ..Self::new()
        }
    }

    pub fn id(&self) -> TargetId { self.id }

    pub(crate) fn hooks(&self) -> Option<&Arc<dyn TargetHooks>> { self.hooks.as_ref() }
}

impl Default for Target {
    fn default() -> Self { Self::new() }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("hooks", &self.hooks.is_some())
            .finish()
    }
}

pub(crate) type Completion = Box<dyn FnOnce(&Request, &Response) + Send>;
