// Cache-first resolution of a city's dataset.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use halalan_common::{CacheKey, CityDataset, NegativeCachePolicy};
use tracing::{debug, info, warn};

use crate::error::ArchiveError;
use crate::source::{CityAddress, DatasetSource};
use crate::store::{CacheEntry, PersistentCache};

/// Resolves normalized (region, province, city) triples to datasets.
///
/// One fetcher per run: with `NegativeCachePolicy::Run` the "unavailable"
/// answers live in this struct and are forgotten when it is dropped.
pub struct CityDataFetcher {
    cache: Arc<PersistentCache>,
    source: Arc<dyn DatasetSource>,
    policy: NegativeCachePolicy,
    run_negatives: Mutex<HashSet<CacheKey>>,
}

impl CityDataFetcher {
    pub fn new(
        cache: Arc<PersistentCache>,
        source: Arc<dyn DatasetSource>,
        policy: NegativeCachePolicy,
    ) -> Self {
        Self {
            cache,
            source,
            policy,
            run_negatives: Mutex::new(HashSet::new()),
        }
    }

    pub fn cache(&self) -> &Arc<PersistentCache> {
        &self.cache
    }

    /// Dataset for a city, or `None` if it is unavailable for any reason.
    /// Never errors; network and parse failures become negative entries.
    pub async fn resolve(
        &self,
        region: &str,
        province: &str,
        city: &str,
    ) -> Option<Arc<CityDataset>> {
        let key = CacheKey::from_names(region, province, city);

        if self.is_run_negative(&key) {
            debug!(key = %key, "Known unavailable this run");
            return None;
        }

        match self.cache.get(&key).await {
            CacheEntry::Present(dataset) => {
                debug!(key = %key, "Cache hit");
                return Some(dataset);
            }
            CacheEntry::Negative => {
                debug!(key = %key, "Cached as unavailable");
                return None;
            }
            CacheEntry::Absent => {}
        }

        let address = CityAddress::new(region, province, city);
        match self.source.fetch(&address).await {
            Ok(dataset) => {
                info!(
                    key = %key,
                    barangays = dataset.data.len(),
                    "Fetched city dataset"
                );
                self.cache.put(&key, Some(&dataset)).await;
                Some(Arc::new(dataset))
            }
            Err(e) => {
                match &e {
                    ArchiveError::NotFound { location, status } => {
                        info!(key = %key, location = %location, status, "City dataset not found");
                    }
                    other => warn!(key = %key, error = %other, "City dataset fetch failed"),
                }
                self.record_negative(key).await;
                None
            }
        }
    }

    fn is_run_negative(&self, key: &CacheKey) -> bool {
        self.run_negatives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    /// Always remembered for the run; also written to the store under
    /// `Persistent`, so a failed cache write still avoids a refetch.
    async fn record_negative(&self, key: CacheKey) {
        if self.policy == NegativeCachePolicy::Persistent {
            self.cache.put(&key, None).await;
        }
        self.run_negatives
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::error::Result;

    /// Every address is missing; counts requests.
    #[derive(Default)]
    struct EmptySource {
        requests: AtomicUsize,
    }

    #[async_trait]
    impl DatasetSource for EmptySource {
        async fn fetch(&self, address: &CityAddress) -> Result<CityDataset> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            Err(ArchiveError::NotFound {
                location: address.relative_path(),
                status: 404,
            })
        }
    }

    #[tokio::test]
    async fn poisoned_negative_set_still_dedupes() {
        let source = Arc::new(EmptySource::default());
        let fetcher = CityDataFetcher::new(
            Arc::new(PersistentCache::in_memory()),
            source.clone(),
            NegativeCachePolicy::Run,
        );

        std::thread::scope(|s| {
            let poisoner = s.spawn(|| {
                let _guard = fetcher.run_negatives.lock().unwrap();
                panic!("poison the negative set");
            });
            assert!(poisoner.join().is_err());
        });
        assert!(fetcher.run_negatives.is_poisoned());

        assert!(fetcher.resolve("CAR", "BENGUET", "BUGUIAS").await.is_none());
        assert!(fetcher.resolve("CAR", "BENGUET", "BUGUIAS").await.is_none());
        assert_eq!(source.requests.load(Ordering::SeqCst), 1);
    }
}
