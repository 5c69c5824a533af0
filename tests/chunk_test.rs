//! Tests for [`ChunkExecutor`] — chunk-plan driving, consistency context,
//! and whole-operation failure on malformed chunk output.

use std::sync::Arc;
use std::sync::Mutex;

use mimesis::chunk::{ChunkExecutor, ChunkPlanner, ChunkRequest};
use mimesis::MimesisError;
use serde_json::Value;

/// Planner matching the canonical sizing example: 2000-token budget with
/// 25% overhead and the flat 100 tokens/item default.
fn planner() -> Arc<ChunkPlanner> {
    Arc::new(ChunkPlanner::new(2_000, true, 250))
}

/// Records every chunk request and produces sequential-id items.
struct RecordingChunker {
    seen: Mutex<Vec<ChunkRequest>>,
    next_id: Mutex<u64>,
}

impl RecordingChunker {
    fn new() -> Self {
        Self {
            seen: Mutex::new(Vec::new()),
            next_id: Mutex::new(1),
        }
    }

    fn produce(&self, request: ChunkRequest) -> String {
        self.seen.lock().unwrap().push(request.clone());
        let mut next = self.next_id.lock().unwrap();
        let items: Vec<String> = (0..request.item_count)
            .map(|_| {
                let id = *next;
                *next += 1;
                format!(r#"{{"id":{id},"name":"user-{id}"}}"#)
            })
            .collect();
        format!("[{}]", items.join(","))
    }
}

#[tokio::test]
async fn unchunked_requests_pass_through_unmodified() {
    let executor = ChunkExecutor::new(planner());

    // Small enough to fit one call; the raw result is returned untouched,
    // not even parsed.
    let result = executor
        .execute_chunked(None, 5, false, |chunk| async move {
            assert_eq!(chunk.index, 0);
            assert_eq!(chunk.total, 1);
            assert_eq!(chunk.item_count, 5);
            assert!(chunk.context.is_none());
            Ok("raw passthrough, not json".to_string())
        })
        .await
        .unwrap();

    assert_eq!(result, "raw passthrough, not json");
}

#[tokio::test]
async fn opt_out_skips_chunking_for_any_size() {
    let executor = ChunkExecutor::new(planner());
    let calls = Mutex::new(0u32);

    executor
        .execute_chunked(None, 200, true, |chunk| {
            *calls.lock().unwrap() += 1;
            async move {
                assert_eq!(chunk.item_count, 200);
                Ok("[]".to_string())
            }
        })
        .await
        .unwrap();

    assert_eq!(*calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn fifty_items_split_into_four_even_chunks() {
    let executor = ChunkExecutor::new(planner());
    let chunker = RecordingChunker::new();

    let result = executor
        .execute_chunked(None, 50, false, |chunk| {
            let raw = chunker.produce(chunk);
            async move { Ok(raw) }
        })
        .await
        .unwrap();

    // budget 1500 / 100 tokens → 15/chunk → 4 chunks → redistributed 13
    let seen = chunker.seen.lock().unwrap();
    let sizes: Vec<usize> = seen.iter().map(|c| c.item_count).collect();
    assert_eq!(sizes, vec![13, 13, 13, 11]);

    let parsed: Value = serde_json::from_str(&result).unwrap();
    let items = parsed.as_array().unwrap();
    assert_eq!(items.len(), 50);
    // ids continue seamlessly across chunk boundaries
    for (i, item) in items.iter().enumerate() {
        assert_eq!(item["id"].as_u64().unwrap(), i as u64 + 1);
    }
}

#[tokio::test]
async fn later_chunks_receive_prior_chunk_context() {
    let executor = ChunkExecutor::new(planner());
    let chunker = RecordingChunker::new();

    executor
        .execute_chunked(None, 50, false, |chunk| {
            let raw = chunker.produce(chunk);
            async move { Ok(raw) }
        })
        .await
        .unwrap();

    let seen = chunker.seen.lock().unwrap();
    assert!(seen[0].context.is_none());

    let second = seen[1].context.as_deref().unwrap();
    assert!(second.contains("chunk 1: 13 items"));
    assert!(second.contains("id=1"));
    assert!(second.contains("id=13"));

    let fourth = seen[3].context.as_deref().unwrap();
    assert!(fourth.contains("Previously generated 39 items"));
    assert!(fourth.contains("chunk 3: 13 items"));
}

#[tokio::test]
async fn malformed_chunk_aborts_the_whole_operation() {
    let executor = ChunkExecutor::new(planner());
    let calls = Mutex::new(0u32);

    let err = executor
        .execute_chunked(None, 50, false, |chunk| {
            *calls.lock().unwrap() += 1;
            async move {
                if chunk.index == 2 {
                    Ok("<html>rate limited</html>".to_string())
                } else {
                    Ok(r#"[{"id":1}]"#.to_string())
                }
            }
        })
        .await
        .unwrap_err();

    match err {
        MimesisError::MalformedChunk { chunk, total, preview } => {
            assert_eq!(chunk, 3);
            assert_eq!(total, 4);
            assert!(preview.contains("<html>"));
        }
        other => panic!("unexpected error: {other}"),
    }
    // chunk 4 never ran — no partial array escapes
    assert_eq!(*calls.lock().unwrap(), 3);
}

#[tokio::test]
async fn single_object_chunks_count_as_one_item() {
    let executor = ChunkExecutor::new(Arc::new(ChunkPlanner::new(200, true, 250)));

    // budget 150 / 100 tokens → 1 item per chunk → 3 chunks of one object
    let result = executor
        .execute_chunked(None, 3, false, |chunk| async move {
            assert_eq!(chunk.item_count, 1);
            Ok(format!(r#"{{"id":{}}}"#, chunk.index))
        })
        .await
        .unwrap();

    let parsed: Value = serde_json::from_str(&result).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 3);
}
