// Bulk store for install: fetch every URL, then store all of them or none.

use anyhow::Result;
use futures::future::try_join_all;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::network::traits::Fetcher;
use crate::storage::traits::{CacheBucket, CachedEntry};
use crate::types::{FetchRequest, RequestKey};

/// Fetch `requests` concurrently and store the responses in `bucket`.
///
/// Any network error or non-2xx status fails the whole batch before a single
/// entry is written. A failed store removes the entries this batch already
/// wrote. Returns the number of entries stored.
pub async fn add_all(
    bucket: &dyn CacheBucket,
    fetcher: &dyn Fetcher,
    requests: Vec<FetchRequest>,
) -> Result<usize> {
    for req in &requests {
        req.key().ensure_cacheable()?;
    }

    let fetched = try_join_all(requests.into_iter().map(|req| async move {
        let resp = fetcher.fetch(&req).await?;
        if !resp.is_ok() {
            warn!(
                "precache rejected url={} status={}",
                req.url,
                resp.status.as_u16()
            );
            return Err(EngineError::BadStatus {
                url: req.url.to_string(),
                status: resp.status.as_u16(),
            }
            .into());
        }
        Ok::<_, anyhow::Error>(CachedEntry::from_response(req.key(), &resp))
    }))
    .await?;

    let mut stored = Vec::with_capacity(fetched.len());
    for entry in fetched {
        debug!("precache store {} bytes={}", entry.key, entry.body.len());
        let key = entry.key.clone();
        if let Err(e) = bucket.put(entry).await {
            warn!(
                "precache store {} failed, rolling back {} entries: {:#}",
                key,
                stored.len(),
                e
            );
            rollback(bucket, &stored).await;
            return Err(e);
        }
        stored.push(key);
    }
    Ok(stored.len())
}

async fn rollback(bucket: &dyn CacheBucket, keys: &[RequestKey]) {
    for key in keys {
        if let Err(e) = bucket.delete(key).await {
            warn!("rollback of {} in {} failed: {:#}", key, bucket.name(), e);
        }
    }
}
