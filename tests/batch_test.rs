//! Tests for [`BatchExecutor`] — strategy dispatch, ordering, timing
//! attribution, and failure propagation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use mimesis::batch::{BatchExecutor, BatchStrategy};
use mimesis::stats::EndpointStatistics;
use mimesis::{CompletionSource, MimesisError, Result};

/// Source producing distinct numbered completions.
struct NumberedSource {
    calls: AtomicU32,
}

impl NumberedSource {
    fn new() -> Self {
        Self {
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl CompletionSource for NumberedSource {
    async fn fetch(&self, _prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("completion-{n}"))
    }
}

/// Source with a native multi-completion call.
struct NativeBatchSource {
    batch_calls: AtomicU32,
}

#[async_trait]
impl CompletionSource for NativeBatchSource {
    async fn fetch(&self, _prompt: &str) -> Result<String> {
        panic!("streaming strategy must use fetch_n");
    }

    async fn fetch_n(&self, _prompt: &str, n: usize) -> Result<Vec<String>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok((0..n).map(|i| format!("native-{i}")).collect())
    }
}

/// Source that fails on its second call.
struct FlakySource {
    calls: AtomicU32,
}

#[async_trait]
impl CompletionSource for FlakySource {
    async fn fetch(&self, _prompt: &str) -> Result<String> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if n == 1 {
            Err(MimesisError::Upstream("second call failed".into()))
        } else {
            Ok(format!("ok-{n}"))
        }
    }
}

fn executor() -> (BatchExecutor, Arc<EndpointStatistics>) {
    let stats = Arc::new(EndpointStatistics::new(20));
    (BatchExecutor::new(Arc::clone(&stats)), stats)
}

#[tokio::test]
async fn sequential_preserves_call_order() {
    let (executor, stats) = executor();
    let source = NumberedSource::new();

    let result = executor
        .execute(&source, "p", 4, BatchStrategy::Sequential, "GET /users", None)
        .await
        .unwrap();

    assert_eq!(result.strategy, BatchStrategy::Sequential);
    assert_eq!(result.items.len(), 4);
    for (i, item) in result.items.iter().enumerate() {
        assert_eq!(item.index, i);
        assert_eq!(item.content, format!("completion-{i}"));
    }
    assert_eq!(stats.snapshot("GET /users").unwrap().samples, 4);
}

#[tokio::test(start_paused = true)]
async fn sequential_delays_between_items_but_not_after_last() {
    let (executor, _) = executor();
    let source = NumberedSource::new();
    let spec = mimesis::DelaySpec::parse("1000");

    let result = executor
        .execute(&source, "p", 3, BatchStrategy::Sequential, "GET /users", spec)
        .await
        .unwrap();

    assert_eq!(result.items[0].delay_ms, 1000);
    assert_eq!(result.items[1].delay_ms, 1000);
    assert_eq!(result.items[2].delay_ms, 0);
    assert_eq!(result.total_delay_ms, 2000);
}

#[tokio::test]
async fn parallel_returns_items_in_requested_order() {
    let (executor, stats) = executor();
    let source = NumberedSource::new();

    let result = executor
        .execute(&source, "p", 5, BatchStrategy::Parallel, "GET /users", None)
        .await
        .unwrap();

    assert_eq!(result.items.len(), 5);
    let indices: Vec<usize> = result.items.iter().map(|i| i.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    // every completion is distinct even though start order is unspecified
    let mut contents: Vec<&str> = result.items.iter().map(|i| i.content.as_str()).collect();
    contents.sort_unstable();
    contents.dedup();
    assert_eq!(contents.len(), 5);
    assert_eq!(stats.snapshot("GET /users").unwrap().samples, 5);
}

#[tokio::test(start_paused = true)]
async fn parallel_staggers_simulated_delays() {
    let (executor, _) = executor();
    let source = NumberedSource::new();
    let spec = mimesis::DelaySpec::parse("500");

    let result = executor
        .execute(&source, "p", 3, BatchStrategy::Parallel, "GET /users", spec)
        .await
        .unwrap();

    // base + index × 100ms
    assert_eq!(result.items[0].delay_ms, 500);
    assert_eq!(result.items[1].delay_ms, 600);
    assert_eq!(result.items[2].delay_ms, 700);
}

#[tokio::test]
async fn streaming_uses_native_batch_call() {
    let (executor, stats) = executor();
    let source = NativeBatchSource {
        batch_calls: AtomicU32::new(0),
    };

    let result = executor
        .execute(&source, "p", 8, BatchStrategy::Streaming, "GET /users", None)
        .await
        .unwrap();

    assert_eq!(source.batch_calls.load(Ordering::SeqCst), 1);
    assert_eq!(result.items.len(), 8);
    assert_eq!(result.items[0].content, "native-0");
    assert_eq!(result.items[7].content, "native-7");
    // one measured latency, attributed across all eight items
    assert_eq!(stats.snapshot("GET /users").unwrap().samples, 8);
}

#[tokio::test]
async fn auto_resolves_by_batch_size() {
    let (executor, _) = executor();

    let source = NumberedSource::new();
    let result = executor
        .execute(&source, "p", 1, BatchStrategy::Auto, "GET /a", None)
        .await
        .unwrap();
    assert_eq!(result.strategy, BatchStrategy::Sequential);

    let source = NumberedSource::new();
    let result = executor
        .execute(&source, "p", 4, BatchStrategy::Auto, "GET /a", None)
        .await
        .unwrap();
    assert_eq!(result.strategy, BatchStrategy::Parallel);

    let source = NativeBatchSource {
        batch_calls: AtomicU32::new(0),
    };
    let result = executor
        .execute(&source, "p", 9, BatchStrategy::Auto, "GET /a", None)
        .await
        .unwrap();
    assert_eq!(result.strategy, BatchStrategy::Streaming);
}

#[tokio::test]
async fn individual_failure_fails_the_whole_batch() {
    let (executor, _) = executor();

    let source = FlakySource {
        calls: AtomicU32::new(0),
    };
    let err = executor
        .execute(&source, "p", 3, BatchStrategy::Sequential, "GET /a", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MimesisError::Upstream(_)));

    let source = FlakySource {
        calls: AtomicU32::new(0),
    };
    let err = executor
        .execute(&source, "p", 3, BatchStrategy::Parallel, "GET /a", None)
        .await
        .unwrap_err();
    assert!(matches!(err, MimesisError::Upstream(_)));
}

#[tokio::test]
async fn totals_are_consistent_with_items() {
    let (executor, _) = executor();
    let source = NumberedSource::new();

    let result = executor
        .execute(&source, "p", 4, BatchStrategy::Sequential, "GET /users", None)
        .await
        .unwrap();

    let sum: u64 = result.items.iter().map(|i| i.request_ms).sum();
    assert_eq!(result.total_request_ms, sum);
    assert_eq!(result.average_request_ms(), sum / 4);
    assert_eq!(result.total_delay_ms, 0);
}
