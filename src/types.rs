// Request/response values passed between the host, the controller and the storage backends.

use std::fmt;

use anyhow::Result;
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use reqwest::Url;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// An outgoing request as seen by fetch interception.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

impl FetchRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn parse_get(url: &str) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| EngineError::InvalidUrl(format!("{}: {}", url, e)))?;
        Ok(Self::get(url))
    }

    /// Identity used for cache lookups.
    pub fn key(&self) -> RequestKey {
        RequestKey::new(&self.method, &self.url)
    }
}

/// Where a response handed back by the controller came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServedFrom {
    Cache,
    Network,
    OfflineFallback,
}

impl ServedFrom {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServedFrom::Cache => "cache",
            ServedFrom::Network => "network",
            ServedFrom::OfflineFallback => "offline-fallback",
        }
    }
}

/// A response payload: what the network returned or what a bucket stored.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub served_from: ServedFrom,
}

impl FetchResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
            served_from: ServedFrom::Network,
        }
    }

    #[must_use]
    pub fn served_from(mut self, served_from: ServedFrom) -> Self {
        self.served_from = served_from;
        self
    }

    /// 2xx, the same check the browser's `Response.ok` makes.
    pub fn is_ok(&self) -> bool {
        self.status.is_success()
    }
}

/// Cache key: method plus absolute URL without fragment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestKey {
    pub method: String,
    pub url: String,
}

impl RequestKey {
    pub fn new(method: &Method, url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self {
            method: method.as_str().to_string(),
            url: url.to_string(),
        }
    }

    /// Only GET entries may be stored or matched.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET.as_str()
    }

    pub fn ensure_cacheable(&self) -> Result<()> {
        if self.is_cacheable() {
            Ok(())
        } else {
            Err(EngineError::NotCacheable {
                method: self.method.clone(),
                url: self.url.clone(),
            }
            .into())
        }
    }
}

impl fmt::Display for RequestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}
