//! Time-based page data cache
//!
//! Assembled page data is served from memory until it is older than the
//! revalidation period. Failed loads are never stored, so an upstream outage
//! or a not-found page is retried on the next request.

use lsfeed_common::errors::Result;
use lsfeed_common::metrics;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Clone)]
struct CachedPage {
    data: Value,
    stored_at: Instant,
}

pub struct PageCache {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, CachedPage>>,
}

impl PageCache {
    /// A zero `ttl` disables caching
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn is_fresh(&self, page: &CachedPage) -> bool {
        page.stored_at.elapsed() < self.ttl
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|p| self.is_fresh(p))
            .map(|p| p.data.clone())
    }

    pub async fn insert(&self, key: String, data: Value) {
        if self.ttl.is_zero() || self.max_entries == 0 {
            return;
        }

        let mut entries = self.entries.write().await;
        entries.retain(|_, p| p.stored_at.elapsed() < self.ttl);
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, p)| p.stored_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key,
            CachedPage {
                data,
                stored_at: Instant::now(),
            },
        );
    }

    /// Cached data for `key`, or the result of `load` stored on success
    pub async fn get_or_load<F, Fut>(&self, page: &'static str, key: String, load: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(data) = self.get(&key).await {
            metrics::record_page_cache(true, page);
            return Ok(data);
        }

        metrics::record_page_cache(false, page);
        debug!(key = %key, "Page cache miss");
        let data = load().await?;
        self.insert(key, data.clone()).await;
        Ok(data)
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
