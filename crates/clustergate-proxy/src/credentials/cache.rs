//! Process-local client certificate cache
//!
//! Sits in front of the per-cluster ConfigMap cache so repeated requests from
//! the same identity do not round-trip to the remote control plane.

use std::fmt;
use std::time::{Duration, Instant};

use dashmap::DashMap;

use super::ClientCertPair;

/// Key of a cached certificate: cluster plus identity key
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    cluster: String,
    identity_key: String,
}

impl CacheKey {
    /// Build a key for `identity_key` on `cluster`
    pub fn new(cluster: impl Into<String>, identity_key: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            identity_key: identity_key.into(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.cluster, self.identity_key)
    }
}

/// Local cache of issued client certificates
pub trait ClientCertCache: Send + Sync {
    /// Cached pair for `key`, if present and fresh
    fn get(&self, key: &CacheKey) -> Option<ClientCertPair>;
    /// Store a pair
    fn insert(&self, key: CacheKey, pair: ClientCertPair);
}

/// Cache that stores nothing
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopCertCache;

impl ClientCertCache for NoopCertCache {
    fn get(&self, _key: &CacheKey) -> Option<ClientCertPair> {
        None
    }

    fn insert(&self, _key: CacheKey, _pair: ClientCertPair) {}
}

struct Entry {
    pair: ClientCertPair,
    inserted: Instant,
}

/// TTL- and capacity-bounded in-memory cache
pub struct MemoryCertCache {
    entries: DashMap<CacheKey, Entry>,
    ttl: Duration,
    capacity: usize,
}

impl MemoryCertCache {
    /// Create a cache holding at most `capacity` entries for `ttl` each
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            capacity: capacity.max(1),
        }
    }

    /// Number of entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict(&self) {
        self.entries.retain(|_, e| e.inserted.elapsed() < self.ttl);

        while self.entries.len() >= self.capacity {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().inserted)
                .map(|e| e.key().clone());
            match oldest {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl ClientCertCache for MemoryCertCache {
    fn get(&self, key: &CacheKey) -> Option<ClientCertPair> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => {
                return Some(entry.pair.clone());
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        None
    }

    fn insert(&self, key: CacheKey, pair: ClientCertPair) {
        if !self.entries.contains_key(&key) {
            self.evict();
        }
        self.entries.insert(
            key,
            Entry {
                pair,
                inserted: Instant::now(),
            },
        );
    }
}
