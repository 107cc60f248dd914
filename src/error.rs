// Error kinds callers need to tell apart. Everything else travels as plain anyhow context.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The request never produced a response (connection refused, DNS, reset).
    #[error("network error for {url}: {reason}")]
    Network { url: String, reason: String },

    /// A response arrived but cannot be precached.
    #[error("bad status {status} for {url}")]
    BadStatus { url: String, status: u16 },

    #[error("request not cacheable: {method} {url}")]
    NotCacheable { method: String, url: String },

    #[error("invalid url: {0}")]
    InvalidUrl(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl EngineError {
    /// True when the error means the network was unreachable.
    pub fn is_network(&self) -> bool {
        matches!(self, EngineError::Network { .. })
    }
}
