//! Mimesis - Adaptive completion delivery pipeline for LLM-backed mock APIs
//!
//! This crate sits between an inbound mock-API request and an upstream
//! completion service. It caches and prefetches responses per logical
//! endpoint, shapes multi-completion timing to imitate a rate-limited
//! real API, tracks per-endpoint latency statistics, and transparently
//! decomposes large bulk-generation requests into token-bounded upstream
//! calls while keeping the combined output consistent.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mimesis::{CompletionSource, DeliveryRequest, Mimesis, PipelineConfig};
//!
//! # struct MyClient;
//! # #[async_trait::async_trait]
//! # impl CompletionSource for MyClient {
//! #     async fn fetch(&self, _prompt: &str) -> mimesis::Result<String> {
//! #         Ok(String::new())
//! #     }
//! # }
//! #[tokio::main]
//! async fn main() -> mimesis::Result<()> {
//!     let pipeline = Mimesis::builder()
//!         .source(Arc::new(MyClient))
//!         .config(PipelineConfig::new().default_delay("500-1500"))
//!         .build()?;
//!
//!     let request = DeliveryRequest::new("GET", "/users", "Generate a plausible user.")
//!         .shape(r#"{"id":0,"name":"","email":""}"#)
//!         .requested_count(50);
//!
//!     let delivery = pipeline.deliver(&request).await?;
//!     println!("{}", delivery.body);
//!     println!("x-ratelimit-limit: {}", delivery.rate_limit.limit);
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod chunk;
pub mod config;
pub mod delay;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod telemetry;
pub mod traits;

// Re-export main types at crate root
pub use error::{MimesisError, Result};
pub use pipeline::{Delivery, DeliveryRequest, Mimesis, Pipeline, PipelineBuilder};
pub use traits::CompletionSource;

// Re-export component types
pub use batch::{BatchCompletionResult, BatchExecutor, BatchStrategy, CompletionItem};
pub use cache::{CacheKey, PrefetchCache};
pub use chunk::{ChunkExecutor, ChunkPlanner, ChunkRequest, ChunkingStrategy, ShapeComplexity};
pub use config::PipelineConfig;
pub use delay::DelaySpec;
pub use stats::{EndpointStatistics, LatencySnapshot, RateLimitInfo};
