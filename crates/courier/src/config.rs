//! File and environment configuration.
//!
//! ```toml
//! default_host = "api.example.com"
//! max_concurrent_requests = 4
//! tls_policy = "PromptAndCache"
//!
//! [endpoints.getUser]
//! url = "/users/{id}"
//! httpMethod = "GET"
//! expectedResultType = "JSON"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Toml};
use serde::Deserialize;
use url::Url;

use crate::data::endpoint::RawEndpoint;
use crate::data::{EndpointTable, TlsPolicy};
use crate::dispatch::DispatchManager;
use crate::effects::Transport;
use crate::error::{Error, Result};
use crate::transfer::{FileCacheSchema, TransferManager};

const ENV_PREFIX: &str = "COURIER_";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub default_host:            Option<String>,
    /// Absent means unbounded.
    pub max_concurrent_requests: Option<usize>,
    pub timeout_secs:            u64,
    pub tls_policy:              TlsPolicy,
    /// Defaults to `courier` under the system temporary directory.
    pub cache_dir:               Option<PathBuf>,
    pub cache_downloads:         bool,
    pub proxies:                 Vec<Url>,
    pub endpoints:               BTreeMap<String, RawEndpoint>,
}

impl Default for CourierConfig {
    fn default() -> Self {
        Self {
            default_host:            None,
            max_concurrent_requests: None,
            timeout_secs:            60,
            tls_policy:              TlsPolicy::TrustCaOnly,
            cache_dir:               None,
            cache_downloads:         true,
            proxies:                 Vec::new(),
            endpoints:               BTreeMap::new(),
        }
    }
}

impl CourierConfig {
    /// Load `path`, then apply `COURIER_*` environment overrides. A missing
    /// file is the same as an empty one.
    pub fn load(path: &Path) -> Result<Self> {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Only the environment.
    pub fn from_env() -> Result<Self> {
        Figment::new()
            .merge(Env::prefixed(ENV_PREFIX))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Figment::new()
            .merge(Toml::string(text))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    pub fn timeout(&self) -> Option<Duration> { (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs)) }

    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("courier"))
    }

    pub fn endpoint_table(&self) -> Result<EndpointTable> { EndpointTable::from_raw(self.endpoints.clone()) }

    /// A manager on `transport` with this configuration applied.
    pub fn dispatch_manager(&self, transport: Arc<dyn Transport>) -> Result<DispatchManager> {
        let manager = DispatchManager::new(transport).with_endpoints(self.endpoint_table()?);
        manager.set_default_host(self.default_host.clone());
        manager.set_maximum_concurrent_requests(self.max_concurrent_requests);
        manager.set_default_timeout(self.timeout());
        manager.set_default_tls_policy(self.tls_policy, None);
        Ok(manager)
    }

    pub fn transfer_manager(&self, dispatch: DispatchManager) -> TransferManager {
        let transfers = TransferManager::new(dispatch, Arc::new(FileCacheSchema::new(self.cache_dir())));
        transfers.set_cache_downloads(self.cache_downloads);
        transfers
    }

    /// The reqwest transport with the configured proxies.
    #[cfg(feature = "reqwest")]
    pub fn transport(&self) -> crate::effects::ReqwestTransport {
        crate::effects::ReqwestTransport::new().with_proxies(self.proxies.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Method;
    use crate::effects::MockTransport;

    const SAMPLE: &str = r#"
default_host = "api.example.com"
max_concurrent_requests = 2
tls_policy = "PromptAndCache"
cache_downloads = false

[endpoints.getUser]
url = "/users/{id}"
httpMethod = "GET"
expectedResultType = "JSON"
"#;

    #[test]
    fn test_defaults_when_empty() {
        let config = CourierConfig::from_toml_str("").unwrap();
        assert_eq!(config.timeout_secs, 60);
        assert_eq!(config.tls_policy, TlsPolicy::TrustCaOnly);
        assert!(config.cache_downloads);
        assert!(config.max_concurrent_requests.is_none());
        assert!(config.endpoints.is_empty());
    }

    #[test]
    fn test_parses_endpoints_and_settings() {
        let config = CourierConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.default_host.as_deref(), Some("api.example.com"));
        assert_eq!(config.max_concurrent_requests, Some(2));
        assert_eq!(config.tls_policy, TlsPolicy::PromptAndCache);
        assert!(!config.cache_downloads);

        let table = config.endpoint_table().unwrap();
        let user = table.get("getUser").unwrap();
        assert_eq!(user.method, Method::Get);
    }

    #[test]
    fn test_invalid_endpoint_is_configuration_error() {
        let config = CourierConfig::from_toml_str("[endpoints.broken]\nhttpMethod = \"GET\"\n").unwrap();
        let err = config.dispatch_manager(Arc::new(MockTransport::default())).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_dispatch_manager_applies_settings() {
        let config = CourierConfig::from_toml_str(SAMPLE).unwrap();
        let manager = config.dispatch_manager(Arc::new(MockTransport::default())).unwrap();
        assert_eq!(manager.default_host().as_deref(), Some("api.example.com"));
        assert_eq!(manager.maximum_concurrent_requests(), Some(2));
        assert_eq!(manager.defaults().timeout, Some(Duration::from_secs(60)));
        assert!(manager.endpoint("getUser").is_some());
    }

    #[test]
    fn test_missing_file_is_empty_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = CourierConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.timeout_secs, 60);
    }
}
