//! Backend identities and their upstream targets.

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::Uri;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

/// Which side of the mirror a request is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendId {
    /// Authoritative backend; its outcome is returned to the client.
    Primary,
    /// Shadow backend; its outcome is only compared.
    Secondary,
}

impl BackendId {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendId::Primary => "primary",
            BackendId::Secondary => "secondary",
        }
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a backend URL cannot be used as an upstream target.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TargetError {
    #[error("invalid backend url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("unsupported scheme '{scheme}' in backend url '{url}' (only http is supported)")]
    UnsupportedScheme { url: String, scheme: String },

    #[error("backend url '{0}' has no host")]
    MissingHost(String),

    #[error("backend url '{0}' must not carry a path, query or fragment")]
    UnexpectedPath(String),
}

/// Fixed upstream destination for one backend: scheme and authority only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTarget {
    scheme: Scheme,
    authority: Authority,
}

impl BackendTarget {
    /// Parse a target from a base URL such as `http://10.0.0.7:8080`.
    pub fn parse(raw: &str) -> Result<Self, TargetError> {
        let url = Url::parse(raw).map_err(|e| TargetError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_url(&url)
    }

    pub fn from_url(url: &Url) -> Result<Self, TargetError> {
        if url.scheme() != "http" {
            return Err(TargetError::UnsupportedScheme {
                url: url.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        let host = url
            .host_str()
            .ok_or_else(|| TargetError::MissingHost(url.to_string()))?;
        if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
            return Err(TargetError::UnexpectedPath(url.to_string()));
        }
        let port = url.port_or_known_default().unwrap_or(80);

        let authority = Authority::from_str(&format!("{}:{}", host, port)).map_err(|e| {
            TargetError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            scheme: Scheme::HTTP,
            authority,
        })
    }

    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Absolute URI for the given origin-form path and query on this target.
    pub fn uri_for(&self, path_and_query: Option<&PathAndQuery>) -> Result<Uri, axum::http::Error> {
        let path_and_query = path_and_query
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));
        Uri::builder()
            .scheme(self.scheme.clone())
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
    }
}

impl fmt::Display for BackendTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.authority)
    }
}

/// The pair of upstream targets an orchestrator mirrors between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendTargets {
    pub primary: BackendTarget,
    pub secondary: BackendTarget,
}

impl BackendTargets {
    pub fn get(&self, backend: BackendId) -> &BackendTarget {
        match backend {
            BackendId::Primary => &self.primary,
            BackendId::Secondary => &self.secondary,
        }
    }
}
