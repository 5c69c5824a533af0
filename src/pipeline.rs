//! Pipeline facade and builder.
//!
//! [`Pipeline`] wires the delivery subsystems together the way an HTTP
//! handler consumes them: a [`DeliveryRequest`] comes in with per-request
//! knobs already parsed, and a complete JSON body plus simulated
//! rate-limit headers come out.
//!
//! Control flow per request: the chunk executor decides whether the bulk
//! size fits one upstream call; single completions are served through the
//! prefetch cache, multi-completion chunks through the batch executor, and
//! the delay calculator / endpoint statistics shape the observed timing
//! throughout.

use std::sync::Arc;
use std::time::Instant;

use tracing::debug;

use crate::batch::{BatchExecutor, BatchStrategy};
use crate::cache::{CacheKey, PrefetchCache};
use crate::chunk::{ChunkExecutor, ChunkPlanner, ChunkRequest};
use crate::config::PipelineConfig;
use crate::delay::{self, DelaySpec};
use crate::stats::{EndpointStatistics, RateLimitInfo};
use crate::telemetry;
use crate::traits::CompletionSource;
use crate::{MimesisError, Result};

/// One inbound mock-API request, parsed upstream into plain values.
#[derive(Debug, Clone)]
pub struct DeliveryRequest {
    /// HTTP method of the mocked route.
    pub method: String,
    /// Path of the mocked route.
    pub path: String,
    /// Raw query string (part of the cache identity).
    pub query: String,
    /// Prompt for the completion source. Authoring happens upstream.
    pub prompt: String,
    /// Response shape template, when one was supplied.
    pub shape: Option<String>,
    /// Requested item count (already extracted from whichever query
    /// parameter the client used).
    pub requested_count: usize,
    /// Batch strategy; `Auto` picks per batch size.
    pub strategy: BatchStrategy,
    /// Per-request delay override (same grammar as the configured
    /// default, e.g. `"500-1500"`).
    pub delay: Option<String>,
    /// Explicit opt-out of bulk chunking.
    pub disable_chunking: bool,
}

impl DeliveryRequest {
    /// Create a request with default knobs (one item, auto strategy).
    pub fn new(
        method: impl Into<String>,
        path: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            query: String::new(),
            prompt: prompt.into(),
            shape: None,
            requested_count: 1,
            strategy: BatchStrategy::Auto,
            delay: None,
            disable_chunking: false,
        }
    }

    /// Set the raw query string.
    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    /// Set the response shape template.
    pub fn shape(mut self, shape: impl Into<String>) -> Self {
        self.shape = Some(shape.into());
        self
    }

    /// Set the requested item count.
    pub fn requested_count(mut self, n: usize) -> Self {
        self.requested_count = n;
        self
    }

    /// Set the batch strategy.
    pub fn strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set a per-request delay override.
    pub fn delay(mut self, spec: impl Into<String>) -> Self {
        self.delay = Some(spec.into());
        self
    }

    /// Opt this request out of bulk chunking.
    pub fn disable_chunking(mut self) -> Self {
        self.disable_chunking = true;
        self
    }

    /// Logical endpoint key used for statistics and rate-limit simulation.
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// A fulfilled request: the JSON body plus simulated rate-limit headers.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Either a single JSON value or, when chunked, one combined JSON array.
    pub body: String,
    /// Rate-limit header triple for the response.
    pub rate_limit: RateLimitInfo,
}

/// Main entry point for creating pipeline instances.
pub struct Mimesis;

impl Mimesis {
    /// Create a new builder for configuring the pipeline.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }
}

/// Builder for configuring pipeline instances.
pub struct PipelineBuilder {
    source: Option<Arc<dyn CompletionSource>>,
    config: PipelineConfig,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            source: None,
            config: PipelineConfig::default(),
        }
    }

    /// Attach the upstream completion source.
    pub fn source(mut self, source: Arc<dyn CompletionSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Replace the whole configuration surface.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the pipeline.
    ///
    /// Fails with [`MimesisError::NoSource`] when no completion source
    /// was attached.
    pub fn build(self) -> Result<Pipeline> {
        let source = self.source.ok_or(MimesisError::NoSource)?;
        let config = self.config;
        let stats = Arc::new(EndpointStatistics::new(config.stats_window));
        let planner = Arc::new(ChunkPlanner::new(
            config.max_output_tokens,
            config.auto_chunk,
            config.max_item_count,
        ));
        Ok(Pipeline {
            cache: Arc::new(PrefetchCache::new(
                config.max_cache_keys,
                config.max_items_per_key,
            )),
            batch: BatchExecutor::new(Arc::clone(&stats)),
            chunker: ChunkExecutor::new(Arc::clone(&planner)),
            planner,
            stats,
            source,
            config,
        })
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The adaptive completion delivery pipeline.
pub struct Pipeline {
    source: Arc<dyn CompletionSource>,
    stats: Arc<EndpointStatistics>,
    cache: Arc<PrefetchCache>,
    batch: BatchExecutor,
    planner: Arc<ChunkPlanner>,
    chunker: ChunkExecutor,
    config: PipelineConfig,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    /// Fulfill one inbound request.
    ///
    /// Returns a complete, valid result or a clearly attributable error —
    /// never partial data.
    pub async fn deliver(&self, request: &DeliveryRequest) -> Result<Delivery> {
        let endpoint = request.endpoint();
        let requested = self.planner.cap_requested(request.requested_count.max(1));
        let spec = request
            .delay
            .as_deref()
            .or(self.config.default_delay.as_deref())
            .and_then(DelaySpec::parse);

        debug!(
            endpoint,
            requested,
            strategy = request.strategy.as_str(),
            "delivering mock response"
        );

        let body = self
            .chunker
            .execute_chunked(
                request.shape.as_deref(),
                requested,
                request.disable_chunking,
                |chunk| self.run_chunk(request, &endpoint, chunk, spec),
            )
            .await?;

        Ok(Delivery {
            body,
            rate_limit: self.stats.rate_limit(&endpoint),
        })
    }

    /// Simulated rate-limit header values for an endpoint.
    pub fn rate_limit(&self, endpoint: &str) -> RateLimitInfo {
        self.stats.rate_limit(endpoint)
    }

    /// The pipeline's latency statistics store.
    pub fn statistics(&self) -> &EndpointStatistics {
        &self.stats
    }

    /// Execute one chunk of a (possibly unchunked) request.
    ///
    /// Single completions go through the prefetch cache; multi-completion
    /// chunks through the batch executor, their items joined into a JSON
    /// array for the chunk executor to parse.
    async fn run_chunk(
        &self,
        request: &DeliveryRequest,
        endpoint: &str,
        chunk: ChunkRequest,
        spec: Option<DelaySpec>,
    ) -> Result<String> {
        let prompt = match &chunk.context {
            Some(context) => format!("{}\n\n{context}", request.prompt),
            None => request.prompt.clone(),
        };

        if chunk.item_count <= 1 {
            return self.single(request, endpoint, &prompt, chunk.context.is_some(), spec)
                .await;
        }

        let result = self
            .batch
            .execute(
                self.source.as_ref(),
                &prompt,
                chunk.item_count,
                request.strategy,
                endpoint,
                spec,
            )
            .await?;
        let contents: Vec<&str> = result.items.iter().map(|i| i.content.as_str()).collect();
        Ok(format!("[{}]", contents.join(",")))
    }

    /// Serve one completion, prefetching per configuration.
    ///
    /// Context-bearing chunk calls bypass the cache: their output depends
    /// on what earlier chunks produced, so a cached completion would break
    /// cross-chunk consistency.
    async fn single(
        &self,
        request: &DeliveryRequest,
        endpoint: &str,
        prompt: &str,
        has_context: bool,
        spec: Option<DelaySpec>,
    ) -> Result<String> {
        let target = if has_context {
            0
        } else {
            self.config.max_items_per_key
        };
        let key = CacheKey::new(
            &request.method,
            &request.path,
            &request.query,
            request.shape.as_deref(),
        );

        let fetch = {
            let source = Arc::clone(&self.source);
            let stats = Arc::clone(&self.stats);
            let endpoint = endpoint.to_owned();
            let prompt = prompt.to_owned();
            move || {
                let source = Arc::clone(&source);
                let stats = Arc::clone(&stats);
                let endpoint = endpoint.clone();
                let prompt = prompt.clone();
                async move {
                    let started = Instant::now();
                    let content = source.fetch(&prompt).await?;
                    let latency_ms = started.elapsed().as_millis() as u64;
                    stats.record(&endpoint, latency_ms);
                    metrics::histogram!(
                        telemetry::REQUEST_DURATION_SECONDS,
                        "endpoint" => endpoint.clone()
                    )
                    .record(latency_ms as f64 / 1000.0);
                    Ok(content)
                }
            }
        };

        let started = Instant::now();
        let content = self.cache.get_or_fetch(key, target, fetch).await?;
        let measured_ms = started.elapsed().as_millis() as u64;

        if let Some(pause) = delay::calculate(spec, measured_ms, self.stats.average_ms(endpoint)) {
            metrics::histogram!(
                telemetry::SIMULATED_DELAY_SECONDS,
                "endpoint" => endpoint.to_owned()
            )
            .record(pause.as_secs_f64());
            tokio::time::sleep(pause).await;
        }
        Ok(content)
    }
}
