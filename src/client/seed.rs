use crate::cache::{CacheKey, Fetcher};
use futures::{stream, StreamExt};
use serde_json::Value;
use tracing::{info, warn};

const PREFETCH_CONCURRENCY: usize = 8;

/// Fetch the initial value of each key once, for `CacheController::seed_many`.
///
/// Failed keys are left out so their first subscriber fetches them normally.
pub async fn prefetch_seeds<F>(fetcher: &F, keys: Vec<CacheKey>) -> Vec<(CacheKey, Value)>
where
    F: Fetcher + ?Sized,
{
    let requested = keys.len();

    let seeds: Vec<(CacheKey, Value)> = stream::iter(keys)
        .map(|key| async move {
            let result = fetcher.fetch(&key).await;
            (key, result)
        })
        .buffer_unordered(PREFETCH_CONCURRENCY)
        .filter_map(|(key, result)| async move {
            match result {
                Ok(value) => Some((key, value)),
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "Prefetch failed, key left unseeded");
                    None
                }
            }
        })
        .collect()
        .await;

    info!(
        requested = requested,
        seeded = seeds.len(),
        "Initial data prefetched"
    );
    seeds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::testing::ScriptedFetcher;
    use crate::error::TrawlError;
    use serde_json::json;

    #[tokio::test]
    async fn test_failures_are_skipped() {
        let fetcher = ScriptedFetcher::new();
        fetcher.respond("/api/runs", Ok(json!([])));
        fetcher.respond(
            "/api/account/profile",
            Err(TrawlError::Unauthenticated("Unauthorized".into())),
        );

        let seeds = prefetch_seeds(
            &fetcher,
            vec![
                CacheKey::from_path("/api/runs"),
                CacheKey::from_path("/api/account/profile"),
            ],
        )
        .await;

        assert_eq!(seeds, vec![(CacheKey::from_path("/api/runs"), json!([]))]);
        assert_eq!(fetcher.total_calls(), 2);
    }
}
