use anyhow::Result;
use async_trait::async_trait;

use crate::types::{FetchRequest, FetchResponse};

/// Performs a request against the network.
///
/// An `Err` means no response was obtained at all. HTTP error statuses are
/// still `Ok` responses; deciding what to do with them is the caller's job.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}
