//! Chunked bulk execution.
//!
//! [`ChunkExecutor`] turns a [`ChunkingStrategy`](super::ChunkingStrategy)
//! into actual upstream calls. Chunks execute strictly in order — chunk
//! k+1's prompt depends on a summary of chunk k's output, so parallelizing
//! here would break cross-chunk consistency.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::planner::ChunkPlanner;
use crate::telemetry;
use crate::{MimesisError, Result};

/// Longest slice of malformed chunk output quoted in an error.
const PREVIEW_LEN: usize = 200;

/// Object fields summarized into the consistency context.
const IDENTITY_FIELDS: [&str; 3] = ["id", "name", "email"];

/// One upstream call of a (possibly chunked) bulk request.
///
/// Handed to the caller-supplied chunk function, which owns prompt
/// authoring; the pipeline only says how many items this call must
/// produce and what came before.
#[derive(Debug, Clone)]
pub struct ChunkRequest {
    /// 0-based chunk index.
    pub index: usize,
    /// Total chunks in this operation (1 when not chunked).
    pub total: usize,
    /// Items this chunk must produce.
    pub item_count: usize,
    /// The requested shape, when one was supplied.
    pub shape: Option<String>,
    /// Consistency summary of prior chunks; `None` for the first chunk
    /// and for unchunked requests.
    pub context: Option<String>,
}

/// Drives a chunk plan to a single combined JSON result.
pub struct ChunkExecutor {
    planner: Arc<ChunkPlanner>,
}

impl ChunkExecutor {
    /// Create an executor over the given planner.
    pub fn new(planner: Arc<ChunkPlanner>) -> Self {
        Self { planner }
    }

    /// Fulfill a bulk request of `requested` items.
    ///
    /// When the planner says no chunking is needed, this delegates once to
    /// `execute_one` and returns its output unmodified. Otherwise chunks
    /// run in order, each raw result is parsed as a JSON array (flattened)
    /// or single value (one element), and the accumulated items are
    /// serialized as one compact JSON array.
    ///
    /// # Errors
    ///
    /// A chunk whose output fails JSON parsing aborts the whole operation
    /// with [`MimesisError::MalformedChunk`] — no partial collection is
    /// ever returned.
    pub async fn execute_chunked<F, Fut>(
        &self,
        shape: Option<&str>,
        requested: usize,
        opt_out: bool,
        execute_one: F,
    ) -> Result<String>
    where
        F: Fn(ChunkRequest) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        if !self.planner.should_chunk(shape, requested, opt_out) {
            return execute_one(ChunkRequest {
                index: 0,
                total: 1,
                item_count: requested,
                shape: shape.map(str::to_owned),
                context: None,
            })
            .await;
        }

        let plan = self.planner.plan(shape, requested);
        metrics::counter!(telemetry::CHUNKED_REQUESTS_TOTAL).increment(1);
        debug!(
            requested,
            chunks = plan.total_chunks,
            items_per_chunk = plan.items_per_chunk,
            tokens_per_item = plan.tokens_per_item,
            "executing chunked bulk request"
        );

        let mut chunks: Vec<Vec<Value>> = Vec::with_capacity(plan.total_chunks);
        for index in 0..plan.total_chunks {
            let request = ChunkRequest {
                index,
                total: plan.total_chunks,
                item_count: plan.chunk_size(index),
                shape: shape.map(str::to_owned),
                context: consistency_context(&chunks),
            };
            let raw = execute_one(request).await?;
            let items = parse_chunk(&raw, index, plan.total_chunks)?;
            debug!(chunk = index + 1, items = items.len(), "chunk parsed");
            chunks.push(items);
        }

        let combined: Vec<Value> = chunks.into_iter().flatten().collect();
        Ok(serde_json::to_string(&Value::Array(combined))?)
    }
}

/// Parse one chunk's raw output into its items.
///
/// Arrays flatten into their elements; any other valid JSON value counts
/// as a single item. Invalid JSON is fatal for the operation.
fn parse_chunk(raw: &str, index: usize, total: usize) -> Result<Vec<Value>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(value) => Ok(vec![value]),
        Err(_) => Err(MimesisError::MalformedChunk {
            chunk: index + 1,
            total,
            preview: preview(raw),
        }),
    }
}

/// Bounded preview of malformed content for error messages.
fn preview(raw: &str) -> String {
    if raw.chars().count() <= PREVIEW_LEN {
        raw.to_string()
    } else {
        let cut: String = raw.chars().take(PREVIEW_LEN).collect();
        format!("{cut}…")
    }
}

/// Summarize prior chunks so the upstream generator continues IDs and
/// patterns coherently.
///
/// Per prior chunk: its item count plus the identifying fields (id, name,
/// email) of its first and last item. Returns `None` when nothing has been
/// generated yet.
fn consistency_context(chunks: &[Vec<Value>]) -> Option<String> {
    if chunks.is_empty() {
        return None;
    }
    let total: usize = chunks.iter().map(Vec::len).sum();
    let mut lines = vec![format!(
        "Previously generated {total} items across {} chunk(s):",
        chunks.len()
    )];
    for (i, items) in chunks.iter().enumerate() {
        let first = items.first().map(identity_summary).unwrap_or_default();
        let last = items.last().map(identity_summary).unwrap_or_default();
        lines.push(format!(
            "- chunk {}: {} items, first {first}, last {last}",
            i + 1,
            items.len()
        ));
    }
    lines.push("Continue identifiers and patterns consistently.".to_string());
    Some(lines.join("\n"))
}

/// Compact `(id=.., name=..)` summary of one generated item.
fn identity_summary(item: &Value) -> String {
    let Value::Object(map) = item else {
        return "(non-object)".to_string();
    };
    let fields: Vec<String> = IDENTITY_FIELDS
        .iter()
        .filter_map(|f| map.get(*f).map(|v| format!("{f}={v}")))
        .collect();
    if fields.is_empty() {
        "(no identifying fields)".to_string()
    } else {
        format!("({})", fields.join(", "))
    }
}
