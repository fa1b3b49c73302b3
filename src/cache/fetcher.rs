//! Network boundary of the cache.
//!
//! The controller only knows this trait. It never retries or caches on its
//! own; the controller decides when to call it again.

use crate::cache::key::CacheKey;
use crate::error::TrawlError;
use async_trait::async_trait;
use serde_json::Value;

pub type FetchResult = Result<Value, TrawlError>;

#[async_trait]
pub trait Fetcher: Send + Sync + 'static {
    /// Retrieve the resource addressed by `key` and unwrap its envelope.
    async fn fetch(&self, key: &CacheKey) -> FetchResult;
}
