use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// What a request does when the server certificate fails validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TlsPolicy {
    /// Only certificates chaining to a trusted CA are accepted.
    #[default]
    #[serde(rename = "TrustCAOnly")]
    TrustCaOnly,
    /// Any certificate is accepted.
    TrustAll,
    /// Ask the challenge handler every time.
    Prompt,
    /// Ask the challenge handler once per fingerprint and remember approvals
    /// in the trust cache.
    PromptAndCache,
}

impl TlsPolicy {
    pub fn prompts(&self) -> bool { matches!(self, TlsPolicy::Prompt | TlsPolicy::PromptAndCache) }
}

/// A certificate chain the transport could not validate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsChallenge {
    host:   String,
    chain:  Vec<Bytes>,
    reason: String,
}

impl TlsChallenge {
    pub fn new(host: impl Into<String>, chain: Vec<Bytes>, reason: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            chain,
            reason: reason.into(),
        }
    }

    pub fn host(&self) -> &str { &self.host }

    /// DER certificates, end entity first.
    pub fn chain(&self) -> &[Bytes] { &self.chain }

    /// Why validation failed, as reported by the TLS stack.
    pub fn reason(&self) -> &str { &self.reason }

    /// Lowercase hex SHA-256 over the host name and every certificate of
    /// the chain. Stable for the same host presenting the same chain.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.host.to_ascii_lowercase().as_bytes());
        for cert in &self.chain {
            hasher.update([0u8]);
            hasher.update((cert.len() as u64).to_be_bytes());
            hasher.update(cert);
        }
        hex::encode(hasher.finalize())
    }
}
