use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, warn};

use super::traits::Fetcher;
use crate::error::EngineError;
use crate::types::{FetchRequest, FetchResponse};

/// Hop-by-hop headers that must not be forwarded upstream.
const SKIPPED_REQUEST_HEADERS: [&str; 4] = ["host", "connection", "content-length", "transfer-encoding"];

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Use a preconfigured client (proxy, TLS roots, pooling).
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let mut req = self
            .client
            .request(request.method.clone(), request.url.clone());
        for (k, v) in &request.headers {
            if SKIPPED_REQUEST_HEADERS.contains(&k.as_str()) {
                continue;
            }
            req = req.header(k, v);
        }

        let resp = req.send().await.map_err(|e| {
            warn!("http fetch failed url={} err={}", request.url, e);
            EngineError::Network {
                url: request.url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let status = resp.status();
        let headers = resp.headers().clone();
        debug!(
            "http fetch {} {} status={}",
            request.method,
            request.url,
            status.as_u16()
        );

        let body = resp.bytes().await.map_err(|e| EngineError::Network {
            url: request.url.to_string(),
            reason: format!("body read failed: {}", e),
        })?;

        Ok(FetchResponse::new(status, headers, body))
    }
}
