//! In-memory cache of acquired images.
//!
//! Acquiring an image can cost several network round trips and a decode, so
//! the acquisition engine remembers every non-original result it produced,
//! placeholders included, and answers repeat requests from memory.
//!
//! ## Cache keys
//!
//! Keys are **content-addressed**: a SHA-256 over the source identifier, the
//! image role and the identity hint. For URL sources the identifier is the
//! URL itself; in-memory files are identified by a SHA-256 of their bytes
//! ([`hash_bytes`]), so re-adding the same file under another name still
//! hits.
//!
//! ## Eviction
//!
//! - Entries older than the TTL are never returned. They are dropped when a
//!   lookup finds them expired.
//! - When an insert pushes the cache past `max_entries`, the oldest inserted
//!   entries go first.
//!
//! The cache is an explicit service object: build one per process, share it
//! behind an `Arc`, and call [`ImageCache::clear`] between tests.

use crate::types::{ImageMethod, ImageProcessingResult, ImageRole};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// SHA-256 of `bytes` as a hex string.
pub fn hash_bytes(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// Lookup key for one acquisition request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(source_id: &str, role: ImageRole, hint: Option<&str>) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"image\0");
        hasher.update(source_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(role.to_string().as_bytes());
        match hint {
            Some(h) => {
                hasher.update(b"\x01");
                hasher.update(h.trim().as_bytes());
            }
            None => hasher.update(b"\x00"),
        }
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct Entry {
    result: ImageProcessingResult,
    inserted: Instant,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<CacheKey, Entry>,
    order: VecDeque<CacheKey>,
}

impl CacheState {
    fn remove(&mut self, key: &CacheKey) {
        self.entries.remove(key);
        self.order.retain(|k| k != key);
    }
}

#[derive(Debug)]
pub struct ImageCache {
    max_entries: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl ImageCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            max_entries: max_entries.max(1),
            ttl,
            state: Mutex::new(CacheState::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Cached result for `key`, unless it has expired.
    pub fn get(&self, key: &CacheKey) -> Option<ImageProcessingResult> {
        let mut state = self.lock();
        let expired = match state.entries.get(key) {
            None => return None,
            Some(entry) => entry.inserted.elapsed() >= self.ttl,
        };
        if expired {
            state.remove(key);
            return None;
        }
        state.entries.get(key).map(|e| e.result.clone())
    }

    /// Store `result`, replacing any previous entry for `key` and evicting
    /// the oldest entries beyond capacity.
    pub fn insert(&self, key: CacheKey, result: ImageProcessingResult) {
        let mut state = self.lock();
        if state.entries.contains_key(&key) {
            state.remove(&key);
        }
        state.order.push_back(key.clone());
        state.entries.insert(
            key,
            Entry {
                result,
                inserted: Instant::now(),
            },
        );
        while state.entries.len() > self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.entries.clear();
        state.order.clear();
    }
}

/// Counters for an acquisition engine's lifetime (or since the last reset).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AcquisitionStats {
    pub requests: u32,
    pub cache_hits: u32,
    pub by_method: BTreeMap<ImageMethod, u32>,
}

impl AcquisitionStats {
    pub fn hit(&mut self) {
        self.requests += 1;
        self.cache_hits += 1;
    }

    pub fn resolved(&mut self, method: ImageMethod) {
        self.requests += 1;
        *self.by_method.entry(method).or_insert(0) += 1;
    }

    pub fn misses(&self) -> u32 {
        self.requests - self.cache_hits
    }

    pub fn fallbacks(&self) -> u32 {
        self.by_method
            .get(&ImageMethod::Fallback)
            .copied()
            .unwrap_or(0)
    }
}

impl fmt::Display for AcquisitionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let methods: Vec<String> = self
            .by_method
            .iter()
            .map(|(method, n)| format!("{n} {method}"))
            .collect();
        if self.cache_hits > 0 {
            write!(
                f,
                "{} images: {} cached, {} resolved",
                self.requests,
                self.cache_hits,
                self.misses()
            )?;
        } else {
            write!(f, "{} images resolved", self.requests)?;
        }
        if !methods.is_empty() {
            write!(f, " ({})", methods.join(", "))?;
        }
        Ok(())
    }
}
