//! Caching subsystem.
//!
//! Two cooperating pieces:
//!
//! - [`CacheKey`] — 64-bit identity of a cacheable request, hashed from
//!   method, path, query string and response shape. Computed per call,
//!   never stored beyond the lookup it serves.
//!
//! - [`prefetch::PrefetchCache`] — per-key bounded store of ready-made
//!   completions with synchronous first-access priming, asynchronous
//!   background refill, and global LRU eviction. See the module docs for
//!   the locking discipline.

pub mod prefetch;

pub use prefetch::PrefetchCache;

use std::hash::{DefaultHasher, Hash, Hasher};

/// Identity of a cacheable request.
///
/// Uses `DefaultHasher` (SipHash) for a reasonable collision-resistance /
/// performance trade-off. The hash is deterministic within a process
/// lifetime, which is sufficient for an in-memory cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey(u64);

impl CacheKey {
    /// Compute the key for a request.
    ///
    /// `shape` is the response shape template, when one was supplied —
    /// two requests to the same route with different shapes must not share
    /// cached completions.
    pub fn new(method: &str, path: &str, query: &str, shape: Option<&str>) -> Self {
        let mut hasher = DefaultHasher::new();
        method.hash(&mut hasher);
        path.hash(&mut hasher);
        query.hash(&mut hasher);
        shape.hash(&mut hasher);
        Self(hasher.finish())
    }

    /// The raw 64-bit hash.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Fingerprint of a completion's content, used for duplicate suppression
/// inside a cache entry.
pub(crate) fn content_hash(content: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_deterministic() {
        let a = CacheKey::new("GET", "/users", "limit=5", None);
        let b = CacheKey::new("GET", "/users", "limit=5", None);
        assert_eq!(a, b);
    }

    #[test]
    fn key_differs_on_method() {
        let a = CacheKey::new("GET", "/users", "", None);
        let b = CacheKey::new("POST", "/users", "", None);
        assert_ne!(a, b);
    }

    #[test]
    fn key_differs_on_shape() {
        let a = CacheKey::new("GET", "/users", "", Some(r#"{"id":0}"#));
        let b = CacheKey::new("GET", "/users", "", None);
        assert_ne!(a, b);
    }
}
