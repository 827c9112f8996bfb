use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};

// Cache entry with timestamp
#[derive(Clone)]
pub struct CacheEntry {
    pub text: String,
    pub created_at: Instant,
}

impl CacheEntry {
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() < ttl
    }
}

pub type BeautifyCache = DashMap<String, CacheEntry>;

// Drop entries older than `ttl`, returns how many went
pub fn evict_expired(cache: &BeautifyCache, ttl: Duration) -> usize {
    let before = cache.len();
    cache.retain(|_, entry| entry.is_fresh(ttl));
    before.saturating_sub(cache.len())
}

// Create a cache key (hash of model + input text)
pub fn make_cache_key(model: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    // separator so ("ab", "c") and ("a", "bc") differ
    hasher.update([0u8]);
    hasher.update(text.trim().as_bytes());
    format!("{:x}", hasher.finalize())
}
