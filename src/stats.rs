//! Per-endpoint latency statistics.
//!
//! [`EndpointStatistics`] keeps a bounded FIFO window of recently observed
//! upstream latencies per logical endpoint. The window feeds two consumers:
//! the delay calculator (for `"avg"` delay specs) and the rate-limit header
//! simulation. Pure data — no upstream calls happen here.
//!
//! Each endpoint's window sits behind its own mutex so unrelated endpoints
//! never contend; the outer map is only locked long enough to clone an `Arc`.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

/// Assumed average latency (ms) before any sample has been recorded.
///
/// Keeps the rate-limit simulation meaningful on the very first request
/// to an endpoint (60 rpm until real data arrives).
const FALLBACK_AVERAGE_MS: u64 = 1_000;

/// Aggregate view of one endpoint's latency window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LatencySnapshot {
    /// Rolling average over the current window, in milliseconds.
    pub average_ms: u64,
    /// Minimum latency in the current window.
    pub min_ms: u64,
    /// Maximum latency in the current window.
    pub max_ms: u64,
    /// Number of samples currently in the window.
    pub samples: usize,
}

/// Simulated rate-limit header values for one endpoint.
///
/// A simple single-bucket derivation from the rolling average, not a true
/// token-bucket: limit = ⌊60000 / avg⌋ requests per minute, remaining is
/// one less, reset is one minute out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    /// Requests-per-minute the observed latency would sustain.
    pub limit: u64,
    /// Remaining requests in the simulated window.
    pub remaining: u64,
    /// Window reset time as Unix epoch seconds.
    pub reset_epoch_secs: u64,
}

#[derive(Debug)]
struct Window {
    latencies: VecDeque<u64>,
    average_ms: u64,
    min_ms: u64,
    max_ms: u64,
}

impl Window {
    fn new() -> Self {
        Self {
            latencies: VecDeque::new(),
            average_ms: 0,
            min_ms: 0,
            max_ms: 0,
        }
    }

    fn record(&mut self, latency_ms: u64, window_size: usize) {
        self.latencies.push_back(latency_ms);
        while self.latencies.len() > window_size {
            self.latencies.pop_front();
        }
        let sum: u64 = self.latencies.iter().sum();
        let len = self.latencies.len() as u64;
        self.average_ms = sum / len;
        self.min_ms = self.latencies.iter().copied().min().unwrap_or(0);
        self.max_ms = self.latencies.iter().copied().max().unwrap_or(0);
    }

    fn snapshot(&self) -> LatencySnapshot {
        LatencySnapshot {
            average_ms: self.average_ms,
            min_ms: self.min_ms,
            max_ms: self.max_ms,
            samples: self.latencies.len(),
        }
    }
}

/// Thread-safe rolling latency profiles, one window per logical endpoint.
///
/// Entries are created on first recorded latency and live for the process
/// lifetime.
pub struct EndpointStatistics {
    endpoints: RwLock<HashMap<String, Arc<Mutex<Window>>>>,
    window_size: usize,
}

impl EndpointStatistics {
    /// Create an empty statistics store with the given window size.
    ///
    /// A window size of zero is treated as one.
    pub fn new(window_size: usize) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            window_size: window_size.max(1),
        }
    }

    /// Record one observed latency for an endpoint.
    pub fn record(&self, endpoint: &str, latency_ms: u64) {
        let window = self.window_for(endpoint);
        let mut window = window.lock().expect("stats window lock poisoned");
        window.record(latency_ms, self.window_size);
        debug!(
            endpoint,
            latency_ms,
            average_ms = window.average_ms,
            samples = window.latencies.len(),
            "recorded endpoint latency"
        );
    }

    /// Current aggregate view of an endpoint's window.
    ///
    /// Returns `None` if no latency has ever been recorded for it.
    pub fn snapshot(&self, endpoint: &str) -> Option<LatencySnapshot> {
        let endpoints = self.endpoints.read().expect("stats map lock poisoned");
        let window = endpoints.get(endpoint)?;
        let window = window.lock().expect("stats window lock poisoned");
        Some(window.snapshot())
    }

    /// Rolling average for an endpoint, if any samples exist.
    pub fn average_ms(&self, endpoint: &str) -> Option<u64> {
        self.snapshot(endpoint).map(|s| s.average_ms)
    }

    /// Derive simulated rate-limit header values for an endpoint.
    ///
    /// Falls back to an assumed 1000 ms average when the endpoint has no
    /// samples yet.
    pub fn rate_limit(&self, endpoint: &str) -> RateLimitInfo {
        let average = self
            .average_ms(endpoint)
            .filter(|avg| *avg > 0)
            .unwrap_or(FALLBACK_AVERAGE_MS);
        let limit = (60_000 / average).max(1);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        RateLimitInfo {
            limit,
            remaining: limit.saturating_sub(1),
            reset_epoch_secs: now + 60,
        }
    }

    fn window_for(&self, endpoint: &str) -> Arc<Mutex<Window>> {
        {
            let endpoints = self.endpoints.read().expect("stats map lock poisoned");
            if let Some(window) = endpoints.get(endpoint) {
                return Arc::clone(window);
            }
        }
        let mut endpoints = self.endpoints.write().expect("stats map lock poisoned");
        Arc::clone(
            endpoints
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Window::new()))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_truncates_to_size() {
        let stats = EndpointStatistics::new(3);
        for latency in [100, 200, 300, 400] {
            stats.record("GET /users", latency);
        }
        let snap = stats.snapshot("GET /users").unwrap();
        assert_eq!(snap.samples, 3);
        // oldest sample (100) fell out
        assert_eq!(snap.min_ms, 200);
        assert_eq!(snap.max_ms, 400);
        assert_eq!(snap.average_ms, 300);
    }

    #[test]
    fn unknown_endpoint_has_no_snapshot() {
        let stats = EndpointStatistics::new(10);
        assert!(stats.snapshot("GET /nothing").is_none());
    }

    #[test]
    fn endpoints_are_independent() {
        let stats = EndpointStatistics::new(10);
        stats.record("GET /a", 100);
        stats.record("GET /b", 900);
        assert_eq!(stats.average_ms("GET /a"), Some(100));
        assert_eq!(stats.average_ms("GET /b"), Some(900));
    }

    #[test]
    fn rate_limit_derivation() {
        let stats = EndpointStatistics::new(10);
        stats.record("GET /users", 500);
        let info = stats.rate_limit("GET /users");
        assert_eq!(info.limit, 120);
        assert_eq!(info.remaining, 119);
        assert!(info.reset_epoch_secs > 0);
    }

    #[test]
    fn rate_limit_without_samples_uses_fallback() {
        let stats = EndpointStatistics::new(10);
        let info = stats.rate_limit("GET /fresh");
        assert_eq!(info.limit, 60);
        assert_eq!(info.remaining, 59);
    }

    #[test]
    fn zero_window_size_is_clamped() {
        let stats = EndpointStatistics::new(0);
        stats.record("GET /x", 10);
        stats.record("GET /x", 20);
        assert_eq!(stats.snapshot("GET /x").unwrap().samples, 1);
    }
}
