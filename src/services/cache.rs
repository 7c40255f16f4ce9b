//! TTL cache for detector output keyed by a fingerprint of the bars.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::services::signals::Detector;
use crate::types::{Bar, LevelSet, PatternMatch, VolumeProfile};

/// Windows each detector cache holds before evicting.
pub const DEFAULT_MAX_WINDOWS: usize = 64;

/// A thread-safe cache with TTL support and a bounded entry count.
pub struct Cache<V> {
    data: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: usize,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<V: Clone> Cache<V> {
    /// Create a new cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self::with_capacity(default_ttl, usize::MAX)
    }

    /// Cache holding at most `max_entries` values.
    pub fn with_capacity(default_ttl: Duration, max_entries: usize) -> Self {
        Self {
            data: DashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
        }
    }

    /// Get a value from the cache.
    pub fn get(&self, key: &str) -> Option<V> {
        let entry = self.data.get(key)?;
        if entry.expires_at > Instant::now() {
            Some(entry.value.clone())
        } else {
            drop(entry);
            self.data.remove(key);
            None
        }
    }

    /// Set a value in the cache with the default TTL.
    ///
    /// At capacity, expired entries go first, then the one closest to expiry.
    pub fn set(&self, key: String, value: V) {
        if !self.data.contains_key(&key) && self.data.len() >= self.max_entries {
            self.cleanup();
            if self.data.len() >= self.max_entries {
                self.evict_oldest();
            }
        }
        self.data.insert(
            key,
            CacheEntry {
                value,
                expires_at: Instant::now() + self.default_ttl,
            },
        );
    }

    /// Remove all expired entries from the cache.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.data.retain(|_, entry| entry.expires_at > now);
    }

    fn evict_oldest(&self) {
        let oldest = self
            .data
            .iter()
            .min_by_key(|entry| entry.value().expires_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.data.remove(&key);
        }
    }

    /// Number of entries (including expired).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Hex SHA-256 over every field of every bar.
pub fn fingerprint(bars: &[Bar]) -> String {
    let mut hasher = Sha256::new();
    hasher.update((bars.len() as u64).to_le_bytes());
    for bar in bars {
        hasher.update(bar.timestamp.to_le_bytes());
        for v in [bar.open, bar.high, bar.low, bar.close, bar.volume] {
            hasher.update(v.to_bits().to_le_bytes());
        }
    }
    hex::encode(hasher.finalize())
}

/// Cache hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

/// Memoizes pattern, level and profile scans of identical windows.
pub struct DetectorCache {
    patterns: Cache<Vec<PatternMatch>>,
    levels: Cache<LevelSet>,
    profiles: Cache<Option<VolumeProfile>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DetectorCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_WINDOWS)
    }

    /// Cache keeping at most `max_windows` windows per detector.
    pub fn with_capacity(ttl: Duration, max_windows: usize) -> Self {
        Self {
            patterns: Cache::with_capacity(ttl, max_windows),
            levels: Cache::with_capacity(ttl, max_windows),
            profiles: Cache::with_capacity(ttl, max_windows),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn patterns<D>(&self, detector: &D, bars: &[Bar], fp: &str) -> Vec<PatternMatch>
    where
        D: Detector<Output = Vec<PatternMatch>>,
    {
        self.get_or_detect(&self.patterns, detector, bars, fp)
    }

    pub fn levels<D>(&self, detector: &D, bars: &[Bar], fp: &str) -> LevelSet
    where
        D: Detector<Output = LevelSet>,
    {
        self.get_or_detect(&self.levels, detector, bars, fp)
    }

    pub fn profile<D>(&self, detector: &D, bars: &[Bar], fp: &str) -> Option<VolumeProfile>
    where
        D: Detector<Output = Option<VolumeProfile>>,
    {
        self.get_or_detect(&self.profiles, detector, bars, fp)
    }

    fn get_or_detect<D>(&self, cache: &Cache<D::Output>, detector: &D, bars: &[Bar], fp: &str) -> D::Output
    where
        D: Detector,
        D::Output: Clone,
    {
        let key = format!("{}:{}", detector.id(), fp);
        if let Some(hit) = cache.get(&key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return hit;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(detector = detector.id(), "Detector cache miss");
        let value = detector.detect(bars);
        cache.set(key, value.clone());
        value
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Drop expired entries from every cache.
    pub fn cleanup(&self) {
        self.patterns.cleanup();
        self.levels.cleanup();
        self.profiles.cleanup();
    }

    pub fn len(&self) -> usize {
        self.patterns.len() + self.levels.len() + self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
