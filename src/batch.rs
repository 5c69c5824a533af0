//! Multi-completion batch execution.
//!
//! [`BatchExecutor`] fulfills "generate N completions" requests using one
//! of three strategies with different ordering and latency trade-offs:
//!
//! - [`BatchStrategy::Sequential`] — strictly serialized calls with a pacing
//!   delay between items. Highest total latency, most faithful imitation of
//!   a rate-limited API.
//! - [`BatchStrategy::Parallel`] — all fetches launched concurrently, results
//!   reordered by original index, pacing applied as a stagger after the
//!   fact. Lower total latency.
//! - [`BatchStrategy::Streaming`] — one native N-completion upstream call;
//!   the single measured latency is split evenly across items.
//!
//! The timing model is a *simulation* of rate limiting, not backpressure:
//! it shapes what the caller observes without throttling upstream
//! concurrency. That is deliberate — the point is to mimic a rate-limited
//! third-party API for client testing.
//!
//! Failure semantics: any individual fetch error fails the whole batch.
//! Partial batches are never returned; the caller decides whether to retry.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tracing::debug;

use crate::delay::{self, DelaySpec};
use crate::stats::EndpointStatistics;
use crate::telemetry;
use crate::traits::CompletionSource;
use crate::Result;

/// Stagger step added per item index when pacing a parallel batch.
const PARALLEL_STAGGER_MS: u64 = 100;

/// How a multi-completion batch is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// One call at a time, delay between calls.
    Sequential,
    /// All calls concurrently, staggered cosmetic pacing.
    Parallel,
    /// One native N-completion call, latency split evenly.
    Streaming,
    /// Pick based on batch size: 1 → Sequential, ≤5 → Parallel,
    /// otherwise Streaming.
    Auto,
}

impl BatchStrategy {
    /// Resolve `Auto` against the batch size; concrete strategies pass
    /// through unchanged.
    pub fn resolve(self, n: usize) -> Self {
        self.dispatch(n).into()
    }

    /// Collapse into the concrete execution path for a batch of `n`.
    fn dispatch(self, n: usize) -> Dispatch {
        match self {
            Self::Sequential => Dispatch::Sequential,
            Self::Parallel => Dispatch::Parallel,
            Self::Streaming => Dispatch::Streaming,
            Self::Auto if n <= 1 => Dispatch::Sequential,
            Self::Auto if n <= 5 => Dispatch::Parallel,
            Self::Auto => Dispatch::Streaming,
        }
    }

    /// Label used for logs and metrics.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::Streaming => "streaming",
            Self::Auto => "auto",
        }
    }
}

/// A strategy with `Auto` already collapsed, so execution dispatch is
/// exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dispatch {
    Sequential,
    Parallel,
    Streaming,
}

impl From<Dispatch> for BatchStrategy {
    fn from(dispatch: Dispatch) -> Self {
        match dispatch {
            Dispatch::Sequential => Self::Sequential,
            Dispatch::Parallel => Self::Parallel,
            Dispatch::Streaming => Self::Streaming,
        }
    }
}

/// One completion inside a batch result.
#[derive(Debug, Clone)]
pub struct CompletionItem {
    /// Position in the caller's requested order.
    pub index: usize,
    /// Generated content.
    pub content: String,
    /// Measured (or attributed) upstream latency for this item, ms.
    pub request_ms: u64,
    /// Simulated pacing delay applied for this item, ms.
    pub delay_ms: u64,
}

/// Outcome of an N-completion batch.
#[derive(Debug, Clone)]
pub struct BatchCompletionResult {
    /// Items in the caller's requested order.
    pub items: Vec<CompletionItem>,
    /// The strategy actually used (`Auto` already resolved).
    pub strategy: BatchStrategy,
    /// Sum of per-item upstream latencies, ms.
    pub total_request_ms: u64,
    /// Sum of per-item simulated delays, ms.
    pub total_delay_ms: u64,
    /// Wall-clock time of the whole batch, ms.
    pub elapsed_ms: u64,
}

impl BatchCompletionResult {
    /// Average upstream latency per item, ms.
    pub fn average_request_ms(&self) -> u64 {
        if self.items.is_empty() {
            0
        } else {
            self.total_request_ms / self.items.len() as u64
        }
    }
}

/// Executes multi-completion batches against a [`CompletionSource`],
/// recording latencies into [`EndpointStatistics`] and shaping observed
/// timing per the selected strategy.
pub struct BatchExecutor {
    stats: Arc<EndpointStatistics>,
}

impl BatchExecutor {
    /// Create an executor recording into the given statistics store.
    pub fn new(stats: Arc<EndpointStatistics>) -> Self {
        Self { stats }
    }

    /// Execute a batch of `n` completions for `prompt`.
    ///
    /// `delay` is the pacing specification (`None` disables pacing).
    /// Returned items always match the caller's requested index order,
    /// whatever the strategy's internal scheduling did.
    pub async fn execute(
        &self,
        source: &dyn CompletionSource,
        prompt: &str,
        n: usize,
        strategy: BatchStrategy,
        endpoint: &str,
        delay: Option<DelaySpec>,
    ) -> Result<BatchCompletionResult> {
        let dispatch = strategy.dispatch(n);
        let resolved = BatchStrategy::from(dispatch);
        let started = Instant::now();

        let outcome = match dispatch {
            Dispatch::Sequential => self.sequential(source, prompt, n, endpoint, delay).await,
            Dispatch::Parallel => self.parallel(source, prompt, n, endpoint, delay).await,
            Dispatch::Streaming => self.streaming(source, prompt, n, endpoint, delay).await,
        };

        let status = if outcome.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::BATCH_REQUESTS_TOTAL,
            "strategy" => resolved.as_str(),
            "status" => status
        )
        .increment(1);

        let items = outcome?;
        let total_request_ms = items.iter().map(|i| i.request_ms).sum();
        let total_delay_ms: u64 = items.iter().map(|i| i.delay_ms).sum();
        metrics::histogram!(telemetry::SIMULATED_DELAY_SECONDS, "endpoint" => endpoint.to_owned())
            .record(total_delay_ms as f64 / 1000.0);

        let result = BatchCompletionResult {
            items,
            strategy: resolved,
            total_request_ms,
            total_delay_ms,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        debug!(
            endpoint,
            n,
            strategy = resolved.as_str(),
            total_request_ms = result.total_request_ms,
            total_delay_ms = result.total_delay_ms,
            elapsed_ms = result.elapsed_ms,
            "batch complete"
        );
        Ok(result)
    }

    /// Strictly serialized: call i+1 never starts before call i's delay
    /// has elapsed.
    async fn sequential(
        &self,
        source: &dyn CompletionSource,
        prompt: &str,
        n: usize,
        endpoint: &str,
        delay: Option<DelaySpec>,
    ) -> Result<Vec<CompletionItem>> {
        let mut items = Vec::with_capacity(n);
        for index in 0..n {
            let started = Instant::now();
            let content = source.fetch(prompt).await?;
            let request_ms = started.elapsed().as_millis() as u64;
            self.record(endpoint, request_ms);

            let mut delay_ms = 0;
            if index + 1 < n {
                if let Some(pause) =
                    delay::calculate(delay, request_ms, self.stats.average_ms(endpoint))
                {
                    delay_ms = pause.as_millis() as u64;
                    tokio::time::sleep(pause).await;
                }
            }
            items.push(CompletionItem {
                index,
                content,
                request_ms,
                delay_ms,
            });
        }
        Ok(items)
    }

    /// Concurrent fetches, index-ordered results, staggered cosmetic pacing.
    async fn parallel(
        &self,
        source: &dyn CompletionSource,
        prompt: &str,
        n: usize,
        endpoint: &str,
        delay: Option<DelaySpec>,
    ) -> Result<Vec<CompletionItem>> {
        let fetches = (0..n).map(|index| async move {
            let started = Instant::now();
            let result = source.fetch(prompt).await;
            (index, result, started.elapsed().as_millis() as u64)
        });
        // join_all preserves input order, so items come back index-ordered.
        let outcomes = join_all(fetches).await;

        let mut items = Vec::with_capacity(n);
        let mut longest_pause = Duration::ZERO;
        for (index, result, request_ms) in outcomes {
            let content = result?;
            self.record(endpoint, request_ms);
            let mut delay_ms = 0;
            if let Some(base) =
                delay::calculate(delay, request_ms, self.stats.average_ms(endpoint))
            {
                let pause = base + Duration::from_millis(index as u64 * PARALLEL_STAGGER_MS);
                delay_ms = pause.as_millis() as u64;
                longest_pause = longest_pause.max(pause);
            }
            items.push(CompletionItem {
                index,
                content,
                request_ms,
                delay_ms,
            });
        }
        // The per-item staggers run concurrently from the caller's point of
        // view, so the observable pacing is the longest one.
        if longest_pause > Duration::ZERO {
            tokio::time::sleep(longest_pause).await;
        }
        Ok(items)
    }

    /// One native N-completion call, measured latency split evenly.
    async fn streaming(
        &self,
        source: &dyn CompletionSource,
        prompt: &str,
        n: usize,
        endpoint: &str,
        delay: Option<DelaySpec>,
    ) -> Result<Vec<CompletionItem>> {
        let started = Instant::now();
        let contents = source.fetch_n(prompt, n).await?;
        let total_ms = started.elapsed().as_millis() as u64;
        let share_ms = if contents.is_empty() {
            0
        } else {
            total_ms / contents.len() as u64
        };

        let count = contents.len();
        let mut items = Vec::with_capacity(count);
        for (index, content) in contents.into_iter().enumerate() {
            self.record(endpoint, share_ms);
            let mut delay_ms = 0;
            if index + 1 < count {
                if let Some(pause) =
                    delay::calculate(delay, share_ms, self.stats.average_ms(endpoint))
                {
                    delay_ms = pause.as_millis() as u64;
                    tokio::time::sleep(pause).await;
                }
            }
            items.push(CompletionItem {
                index,
                content,
                request_ms: share_ms,
                delay_ms,
            });
        }
        Ok(items)
    }

    fn record(&self, endpoint: &str, latency_ms: u64) {
        self.stats.record(endpoint, latency_ms);
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS, "endpoint" => endpoint.to_owned())
            .record(latency_ms as f64 / 1000.0);
    }
}
