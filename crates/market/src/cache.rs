//! TTL cache in front of the provider.
//!
//! Keys are human-readable `category:args` strings (`quote:1.600519`,
//! `limit:20260823`). Three TTL classes cover the data categories: realtime
//! quotes, rankings, and daily figures that only move once per trade date.
//! Concurrent fetches of one key are coalesced behind a per-key flight
//! guard, and when an upstream fetch fails an expired entry is served stale
//! rather than dropping the answer on the floor.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use quotebot_core::types::secs_until_beijing_midnight;
use quotebot_core::{CacheConfig, Config, Paths, Result};

/// Outcome of a cache lookup-or-fetch.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheHit {
    /// Entry within its TTL, or the result of a fetch that just ran.
    Fresh(Value),
    /// Upstream failed; an expired entry was served instead.
    Stale(Value),
}

impl CacheHit {
    pub fn payload(&self) -> &Value {
        match self {
            CacheHit::Fresh(v) | CacheHit::Stale(v) => v,
        }
    }

    pub fn into_payload(self) -> Value {
        match self {
            CacheHit::Fresh(v) | CacheHit::Stale(v) => v,
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, CacheHit::Stale(_))
    }
}

/// TTL class per data category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlClass {
    /// Quotes, intraday series, realtime flow.
    Realtime,
    /// Rankings and historical klines.
    Ranking,
    /// Figures fixed per trade date; expire at Beijing midnight.
    Daily,
}

struct CacheEntry {
    payload: Value,
    fetched_at: Instant,
    ttl: Duration,
    /// Millis since cache start. Relaxed ordering is enough for LRU ranking.
    last_used: AtomicU64,
}

impl CacheEntry {
    fn new(payload: Value, ttl: Duration, now_ms: u64) -> Self {
        Self {
            payload,
            fetched_at: Instant::now(),
            ttl,
            last_used: AtomicU64::new(now_ms),
        }
    }

    fn is_fresh(&self) -> bool {
        self.fetched_at.elapsed() <= self.ttl
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
}

pub struct QuoteCache {
    started: Instant,
    max_entries: usize,
    realtime_ttl: Duration,
    ranking_ttl: Duration,
    entries: RwLock<HashMap<String, CacheEntry>>,
    inflight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl QuoteCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            started: Instant::now(),
            max_entries: config.max_entries.max(1),
            realtime_ttl: Duration::from_secs(config.realtime_ttl_secs.clamp(30, 60)),
            ranking_ttl: Duration::from_secs(config.ranking_ttl_secs.clamp(60, 120)),
            entries: RwLock::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// Effective TTL for a class. Daily entries run until Beijing midnight,
    /// when the trade date they describe rolls over.
    pub fn ttl(&self, class: TtlClass) -> Duration {
        match class {
            TtlClass::Realtime => self.realtime_ttl,
            TtlClass::Ranking => self.ranking_ttl,
            TtlClass::Daily => Duration::from_secs(secs_until_beijing_midnight()),
        }
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.read().await.len(),
            capacity: self.max_entries,
        }
    }

    /// Serve `key` from cache or run `fetch`, coalescing concurrent fetches
    /// of the same key. On fetch failure an expired entry is served stale;
    /// the error only propagates when the cache holds nothing for the key.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, ttl: Duration, fetch: F) -> Result<CacheHit>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>>,
    {
        if let Some(payload) = self.read_fresh(key).await {
            return Ok(CacheHit::Fresh(payload));
        }

        let guard = self.flight_guard(key).await;
        let lock = guard.lock().await;

        // Another task may have filled the entry while we waited.
        if let Some(payload) = self.read_fresh(key).await {
            drop(lock);
            self.release_flight(key).await;
            return Ok(CacheHit::Fresh(payload));
        }

        let outcome = match fetch().await {
            Ok(payload) => {
                self.insert(key, payload.clone(), ttl).await;
                debug!(key = %key, ttl_secs = ttl.as_secs(), "cache fill");
                Ok(CacheHit::Fresh(payload))
            }
            Err(err) => match self.read_any(key).await {
                Some(prior) => {
                    warn!(key = %key, error = %err, "fetch failed, serving stale cache entry");
                    Ok(CacheHit::Stale(prior))
                }
                None => Err(err),
            },
        };

        drop(lock);
        self.release_flight(key).await;
        outcome
    }

    fn now_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    async fn read_fresh(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        let entry = entries.get(key)?;
        if !entry.is_fresh() {
            // Expired entries stay put; they back the stale fallback.
            return None;
        }
        entry.last_used.store(self.now_ms(), Ordering::Relaxed);
        Some(entry.payload.clone())
    }

    async fn read_any(&self, key: &str) -> Option<Value> {
        let entries = self.entries.read().await;
        entries.get(key).map(|e| e.payload.clone())
    }

    async fn insert(&self, key: &str, payload: Value, ttl: Duration) {
        let mut entries = self.entries.write().await;
        if !entries.contains_key(key) && entries.len() >= self.max_entries {
            let victim = entries
                .iter()
                .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());
            if let Some(victim) = victim {
                debug!(key = %victim, "cache evict");
                entries.remove(&victim);
            }
        }
        entries.insert(key.to_string(), CacheEntry::new(payload, ttl, self.now_ms()));
    }

    async fn flight_guard(&self, key: &str) -> Arc<Mutex<()>> {
        let mut inflight = self.inflight.lock().await;
        inflight
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn release_flight(&self, key: &str) {
        let mut inflight = self.inflight.lock().await;
        if let Some(guard) = inflight.get(key) {
            // Two strong counts mean the map entry plus ours: nobody waits.
            if Arc::strong_count(guard) <= 2 {
                inflight.remove(key);
            }
        }
    }
}

static GLOBAL: Lazy<Arc<QuoteCache>> = Lazy::new(|| {
    let config = Config::load_or_default(&Paths::new()).unwrap_or_default();
    Arc::new(QuoteCache::new(&config.cache))
});

/// Process-wide cache shared by every pipeline built with defaults.
pub fn global() -> Arc<QuoteCache> {
    GLOBAL.clone()
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use serde_json::json;

    use quotebot_core::Error;

    use super::*;

    fn test_cache(max_entries: usize) -> QuoteCache {
        QuoteCache::new(&CacheConfig {
            max_entries,
            realtime_ttl_secs: 45,
            ranking_ttl_secs: 90,
        })
    }

    async fn fill(cache: &QuoteCache, key: &str, val: i64) {
        cache
            .get_or_fetch(key, Duration::from_secs(60), move || async move {
                Ok::<Value, Error>(json!(val))
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_memoizes_within_ttl() {
        let cache = test_cache(64);
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let calls = calls.clone();
            let hit = cache
                .get_or_fetch("quote:1.600519", Duration::from_secs(60), move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<Value, Error>(json!({"price": 1530.0}))
                })
                .await
                .unwrap();
            assert!(!hit.is_stale());
            assert_eq!(hit.payload()["price"], 1530.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stale_fallback_on_fetch_error() {
        let cache = test_cache(64);
        // Zero TTL expires the entry immediately.
        cache
            .get_or_fetch("limit:20260821", Duration::ZERO, || async {
                Ok::<Value, Error>(json!({"up_count": 42}))
            })
            .await
            .unwrap();

        let hit = cache
            .get_or_fetch("limit:20260821", Duration::ZERO, || async {
                Err::<Value, Error>(Error::Provider("eastmoney down".into()))
            })
            .await
            .unwrap();
        assert!(hit.is_stale());
        assert_eq!(hit.payload()["up_count"], 42);
    }

    #[tokio::test]
    async fn test_error_propagates_when_cache_empty() {
        let cache = test_cache(64);
        let err = cache
            .get_or_fetch("quote:0.300750", Duration::from_secs(60), || async {
                Err::<Value, Error>(Error::Provider("eastmoney down".into()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(cache.stats().await.entries, 0);
    }

    #[tokio::test]
    async fn test_coalesces_concurrent_fetches() {
        let cache = Arc::new(test_cache(64));
        let calls = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..5 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_fetch("quote:1.600519", Duration::from_secs(60), move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<Value, Error>(json!({"price": 1530.0}))
                    })
                    .await
            }));
        }
        for handle in handles {
            let hit = handle.await.unwrap().unwrap();
            assert_eq!(hit.payload()["price"], 1530.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_evicts_least_recently_used() {
        let cache = test_cache(2);
        fill(&cache, "quote:a", 1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        fill(&cache, "quote:b", 2).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        // Touch a so b becomes the LRU victim.
        fill(&cache, "quote:a", 1).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        fill(&cache, "quote:c", 3).await;

        assert!(cache.read_any("quote:a").await.is_some());
        assert!(cache.read_any("quote:b").await.is_none());
        assert!(cache.read_any("quote:c").await.is_some());
        let stats = cache.stats().await;
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.capacity, 2);
    }

    #[tokio::test]
    async fn test_ttl_class_clamps() {
        let cache = QuoteCache::new(&CacheConfig {
            max_entries: 8,
            realtime_ttl_secs: 5,
            ranking_ttl_secs: 600,
        });
        assert_eq!(cache.ttl(TtlClass::Realtime), Duration::from_secs(30));
        assert_eq!(cache.ttl(TtlClass::Ranking), Duration::from_secs(120));
        let daily = cache.ttl(TtlClass::Daily);
        assert!(daily >= Duration::from_secs(60));
        assert!(daily <= Duration::from_secs(86_400));
    }
}
