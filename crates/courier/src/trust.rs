//! User-approved certificate exceptions and the challenge prompt.

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::oneshot;

use crate::data::{TlsChallenge, TlsPolicy};
use crate::sync::{read, write};

/// Fingerprints of certificate chains the user has approved.
///
/// Shared by every request of a manager; reads run concurrently, writes
/// are exclusive.
#[derive(Debug, Default)]
pub struct TrustCache {
    approved: RwLock<HashSet<String>>,
}

impl TrustCache {
    pub fn new() -> Self { Self::default() }

    pub fn permits(&self, fingerprint: &str) -> bool { read(&self.approved).contains(fingerprint) }

    /// Returns `false` if the fingerprint was already present.
    pub fn insert(&self, fingerprint: impl Into<String>) -> bool { write(&self.approved).insert(fingerprint.into()) }

    pub fn remove(&self, fingerprint: &str) -> bool { write(&self.approved).remove(fingerprint) }

    pub fn clear(&self) { write(&self.approved).clear(); }

    pub fn len(&self) -> usize { read(&self.approved).len() }

    pub fn is_empty(&self) -> bool { read(&self.approved).is_empty() }

    pub fn fingerprints(&self) -> Vec<String> { read(&self.approved).iter().cloned().collect() }
}

/// One-shot answer to a certificate challenge. Dropping it unanswered
/// denies the challenge.
pub struct ChallengeResponder(oneshot::Sender<bool>);

impl ChallengeResponder {
    pub(crate) fn channel() -> (Self, oneshot::Receiver<bool>) {
        let (tx, rx) = oneshot::channel();
        (Self(tx), rx)
    }

    pub fn respond(self, allow: bool) {
        // The request may have been cancelled while the prompt was open.
        let _ = self.0.send(allow);
    }

    pub fn allow(self) { self.respond(true) }

    pub fn deny(self) { self.respond(false) }
}

impl fmt::Debug for ChallengeResponder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str("ChallengeResponder") }
}

/// Decides whether an untrusted certificate chain may be used.
///
/// Called from the request task; the answer may be given later from any
/// thread through the responder.
pub trait ChallengeHandler: Send + Sync {
    fn on_challenge(&self, challenge: TlsChallenge, responder: ChallengeResponder);
}

impl<F> ChallengeHandler for F
where
    F: Fn(TlsChallenge, ChallengeResponder) + Send + Sync,
{
    fn on_challenge(&self, challenge: TlsChallenge, responder: ChallengeResponder) { self(challenge, responder) }
}

/// Run the challenge through `policy`. Returns whether the chain is
/// accepted.
pub(crate) async fn resolve_challenge(
    policy: TlsPolicy,
    handler: Option<&Arc<dyn ChallengeHandler>>,
    cache: &TrustCache,
    challenge: TlsChallenge,
) -> bool {
    let fingerprint = challenge.fingerprint();
    match policy {
        TlsPolicy::TrustCaOnly => return false,
        TlsPolicy::TrustAll => return true,
        TlsPolicy::PromptAndCache if cache.permits(&fingerprint) => return true,
        TlsPolicy::Prompt | TlsPolicy::PromptAndCache => {}
    }

    let Some(handler) = handler else {
        tracing::warn!(host = challenge.host(), "certificate challenge with no handler installed");
        return false;
    };
    tracing::debug!(host = challenge.host(), %fingerprint, "prompting for certificate challenge");
    let (responder, answer) = ChallengeResponder::channel();
    handler.on_challenge(challenge, responder);
    let allowed = answer.await.unwrap_or(false);

    if allowed && policy == TlsPolicy::PromptAndCache {
        cache.insert(fingerprint);
    }
    allowed
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;

    use super::*;

    fn challenge() -> TlsChallenge {
        TlsChallenge::new("self.test", vec![Bytes::from_static(b"cert")], "UnknownIssuer")
    }

    fn counting(allow: bool, count: Arc<AtomicUsize>) -> Arc<dyn ChallengeHandler> {
        Arc::new(move |_c: TlsChallenge, r: ChallengeResponder| {
            count.fetch_add(1, Ordering::SeqCst);
            r.respond(allow);
        })
    }

    #[tokio::test]
    async fn test_prompt_and_cache_asks_once() {
        let cache = TrustCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting(true, count.clone());

        assert!(resolve_challenge(TlsPolicy::PromptAndCache, Some(&handler), &cache, challenge()).await);
        assert!(resolve_challenge(TlsPolicy::PromptAndCache, Some(&handler), &cache, challenge()).await);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(cache.permits(&challenge().fingerprint()));
    }

    #[tokio::test]
    async fn test_prompt_never_caches() {
        let cache = TrustCache::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handler = counting(true, count.clone());

        resolve_challenge(TlsPolicy::Prompt, Some(&handler), &cache, challenge()).await;
        resolve_challenge(TlsPolicy::Prompt, Some(&handler), &cache, challenge()).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_denial_and_dropped_responder() {
        let cache = TrustCache::new();
        let deny = counting(false, Arc::new(AtomicUsize::new(0)));
        assert!(!resolve_challenge(TlsPolicy::PromptAndCache, Some(&deny), &cache, challenge()).await);
        assert!(cache.is_empty());

        let drop_it: Arc<dyn ChallengeHandler> = Arc::new(|_c: TlsChallenge, r: ChallengeResponder| drop(r));
        assert!(!resolve_challenge(TlsPolicy::Prompt, Some(&drop_it), &cache, challenge()).await);
        assert!(!resolve_challenge(TlsPolicy::Prompt, None, &cache, challenge()).await);
    }

    #[tokio::test]
    async fn test_ca_only_rejects_even_cached() {
        let cache = TrustCache::new();
        cache.insert(challenge().fingerprint());
        assert!(!resolve_challenge(TlsPolicy::TrustCaOnly, None, &cache, challenge()).await);
    }
}
