//! Declarative endpoint definitions, validated when loaded.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use url::Url;

use crate::core::template::substitute;
use crate::data::{BodyType, HeaderList, Method, ResultKind};
use crate::error::{Error, Result};

/// The loosely typed shape endpoint files are written in. Field names are
/// the established ones (`url`, `httpMethod`, `expectedResultType`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEndpoint {
    pub url:                   Option<String>,
    pub http_method:           Option<String>,
    pub expected_result_type:  Option<String>,
    pub body_type:             Option<String>,
    pub host:                  Option<String>,
    pub success_selector_name: Option<String>,
    pub failure_selector_name: Option<String>,
    #[serde(default)]
    pub headers:               BTreeMap<String, String>,
}

/// One named, reusable API call.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointDefinition {
    pub key:          String,
    /// Absolute URL or a path, possibly with `{placeholder}`s.
    pub url:          String,
    pub method:       Method,
    pub result_kind:  ResultKind,
    pub body_type:    BodyType,
    /// Host used instead of the manager's default host.
    pub host:         Option<String>,
    pub headers:      HeaderList,
    pub success_hook: Option<String>,
    pub failure_hook: Option<String>,
}

impl EndpointDefinition {
    pub fn new(key: impl Into<String>, method: Method, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            method,
            result_kind: ResultKind::default(),
            body_type: BodyType::default(),
            host: None,
            headers: HeaderList::new(),
            success_hook: None,
            failure_hook: None,
        }
    }

    #[must_use]
    pub fn result_kind(mut self, kind: ResultKind) -> Self {
        self.result_kind = kind;
        self
    }

    #[must_use]
    pub fn body_type(mut self, body_type: BodyType) -> Self {
        self.body_type = body_type;
        self
    }

    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.set(name, value);
        self
    }

    #[must_use]
    pub fn hooks(mut self, success: impl Into<String>, failure: impl Into<String>) -> Self {
        self.success_hook = Some(success.into());
        self.failure_hook = Some(failure.into());
        self
    }

    /// Validate a raw entry. Missing `url` and unknown method or kind names
    /// are configuration errors.
    pub fn from_raw(key: impl Into<String>, raw: RawEndpoint) -> Result<Self> {
        let key = key.into();
        let url = raw
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| Error::config(format!("endpoint `{key}` has no url")))?;
        let method = raw.http_method.as_deref().map(str::parse).transpose()?.unwrap_or_default();
        let result_kind = raw
            .expected_result_type
            .as_deref()
            .map(str::parse)
            .transpose()?
            .unwrap_or_default();
        let body_type = raw.body_type.as_deref().map(str::parse).transpose()?.unwrap_or_default();

        Ok(Self {
            key,
            url,
            method,
            result_kind,
            body_type,
            host: raw.host.filter(|h| !h.trim().is_empty()),
            headers: raw.headers.into_iter().collect(),
            success_hook: raw.success_selector_name,
            failure_hook: raw.failure_selector_name,
        })
    }

    /// Whether the definition pins its own host.
    pub fn has_own_host(&self) -> bool { self.host.is_some() || Url::parse(&self.url).is_ok() }

    /// Build the final URL: substitute `values` into the template, then
    /// prefix a host unless the template is already absolute.
    pub fn resolve_url(&self, default_host: Option<&str>, values: &[String]) -> Result<Url> {
        let filled = substitute(&self.url, values)?;
        if let Ok(absolute) = Url::parse(&filled) {
            return Ok(absolute);
        }

        let host = self.host.as_deref().or(default_host).ok_or_else(|| {
            Error::config(format!("endpoint `{}` has a relative url and no host is set", self.key))
        })?;
        let base = if host.contains("://") {
            host.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", host.trim_end_matches('/'))
        };
        let path = if filled.starts_with('/') {
            filled
        } else {
            format!("/{filled}")
        };
        Url::parse(&format!("{base}{path}"))
            .map_err(|e| Error::config(format!("endpoint `{}` resolves to an invalid url: {e}", self.key)))
    }
}

/// Endpoint definitions keyed by name.
#[derive(Debug, Clone, Default)]
pub struct EndpointTable {
    endpoints: HashMap<String, EndpointDefinition>,
}

impl EndpointTable {
    pub fn new() -> Self { Self::default() }

    pub fn from_raw(raw: BTreeMap<String, RawEndpoint>) -> Result<Self> {
        let mut table = Self::new();
        for (key, entry) in raw {
            table.insert(EndpointDefinition::from_raw(key, entry)?);
        }
        Ok(table)
    }

    /// Parse a TOML document whose tables are endpoint keys.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawEndpoint> =
            toml::from_str(text).map_err(|e| Error::config(format!("invalid endpoint file: {e}")))?;
        Self::from_raw(raw)
    }

    /// Parse a JSON object whose members are endpoint keys.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: BTreeMap<String, RawEndpoint> =
            serde_json::from_str(text).map_err(|e| Error::config(format!("invalid endpoint file: {e}")))?;
        Self::from_raw(raw)
    }

    pub fn insert(&mut self, definition: EndpointDefinition) -> Option<EndpointDefinition> {
        self.endpoints.insert(definition.key.clone(), definition)
    }

    /// Move every definition of `other` in, replacing same-named ones.
    pub fn extend(&mut self, other: EndpointTable) { self.endpoints.extend(other.endpoints); }

    pub fn get(&self, key: &str) -> Option<&EndpointDefinition> { self.endpoints.get(key) }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut EndpointDefinition> { self.endpoints.get_mut(key) }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.endpoints.keys().map(String::as_str) }

    pub fn len(&self) -> usize { self.endpoints.len() }

    pub fn is_empty(&self) -> bool { self.endpoints.is_empty() }
}
