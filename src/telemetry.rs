//! Telemetry metric name constants.
//!
//! Centralised metric names for mimesis operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `mimesis_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `endpoint` — logical endpoint key (e.g. "GET /users")
//! - `strategy` — batch strategy used ("sequential" | "parallel" | "streaming")
//! - `status` — outcome: "ok" or "error"

/// Total completions served from the prefetch cache without an upstream call.
///
/// No labels (keys are high-cardinality hashes).
pub const CACHE_HITS_TOTAL: &str = "mimesis_cache_hits_total";

/// Total completions that required a direct upstream fetch.
pub const CACHE_MISSES_TOTAL: &str = "mimesis_cache_misses_total";

/// Total background refill tasks launched by the prefetch cache.
pub const REFILLS_TOTAL: &str = "mimesis_refills_total";

/// Total cache keys removed by LRU eviction sweeps.
pub const EVICTIONS_TOTAL: &str = "mimesis_evictions_total";

/// Total batch executions.
///
/// Labels: `strategy`, `status` ("ok" | "error").
pub const BATCH_REQUESTS_TOTAL: &str = "mimesis_batch_requests_total";

/// Total bulk requests that were decomposed into multiple chunks.
pub const CHUNKED_REQUESTS_TOTAL: &str = "mimesis_chunked_requests_total";

/// Upstream request duration in seconds, as measured by the pipeline.
///
/// Labels: `endpoint`.
pub const REQUEST_DURATION_SECONDS: &str = "mimesis_request_duration_seconds";

/// Simulated pacing delay applied to the caller, in seconds.
///
/// Labels: `endpoint`.
pub const SIMULATED_DELAY_SECONDS: &str = "mimesis_simulated_delay_seconds";
