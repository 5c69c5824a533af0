//! Bulk-request chunk planning.
//!
//! Estimates how expensive one generated item is (in output tokens) from
//! the structural complexity of the requested shape, then decides whether a
//! bulk request fits in a single upstream call or must be decomposed into
//! token-bounded chunks.

use moka::sync::Cache;
use serde_json::Value;
use tracing::warn;

/// Rough characters-per-token ratio for JSON output.
const CHARS_PER_TOKEN: f64 = 4.0;

/// Flat per-item cost assumed when no shape was supplied.
const DEFAULT_TOKENS_PER_ITEM: usize = 100;

/// Clamp bounds for the per-item token estimate.
const MIN_TOKENS_PER_ITEM: f64 = 50.0;
const MAX_TOKENS_PER_ITEM: f64 = 1_000.0;

/// Clamp bounds for the complexity multiplier.
const MIN_MULTIPLIER: f64 = 1.0;
const MAX_MULTIPLIER: f64 = 5.0;

/// Share of the output-token budget reserved for prompt/instruction
/// overhead rather than generated items.
const OVERHEAD_RATIO: f64 = 0.25;

/// Memoized complexity profiles for distinct shapes.
const COMPLEXITY_CACHE_MAX: u64 = 1_000;

/// Structural profile of a target JSON shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeComplexity {
    /// Maximum container nesting depth.
    pub depth: usize,
    /// Total array occurrences.
    pub array_count: usize,
    /// Total property count across all objects.
    pub property_count: usize,
    /// Derived cost multiplier, clamped to `[1.0, 5.0]`.
    pub multiplier: f64,
}

impl ShapeComplexity {
    /// Analyze a shape string.
    ///
    /// Parses as JSON and walks the value tree; shapes that are not valid
    /// JSON (template placeholders, trailing commas) fall back to counting
    /// braces and brackets, which is close enough for a cost estimate.
    pub fn analyze(shape: &str) -> Self {
        let (depth, array_count, property_count) = match serde_json::from_str::<Value>(shape) {
            Ok(value) => {
                let mut profile = (0, 0, 0);
                walk(&value, 0, &mut profile);
                profile
            }
            Err(_) => scan_brackets(shape),
        };
        let multiplier = (1.0
            + depth.saturating_sub(2) as f64 * 0.5
            + array_count as f64 * 0.3
            + property_count.saturating_sub(5) as f64 * 0.05)
            .clamp(MIN_MULTIPLIER, MAX_MULTIPLIER);
        Self {
            depth,
            array_count,
            property_count,
            multiplier,
        }
    }
}

fn walk(value: &Value, depth: usize, profile: &mut (usize, usize, usize)) {
    match value {
        Value::Object(map) => {
            profile.0 = profile.0.max(depth + 1);
            profile.2 += map.len();
            for child in map.values() {
                walk(child, depth + 1, profile);
            }
        }
        Value::Array(items) => {
            profile.0 = profile.0.max(depth + 1);
            profile.1 += 1;
            for child in items {
                walk(child, depth + 1, profile);
            }
        }
        _ => {}
    }
}

/// Bracket-counting fallback for shapes that are not parseable JSON.
fn scan_brackets(shape: &str) -> (usize, usize, usize) {
    let mut depth = 0usize;
    let mut max_depth = 0usize;
    let mut arrays = 0usize;
    let mut properties = 0usize;
    for c in shape.chars() {
        match c {
            '{' => {
                depth += 1;
                max_depth = max_depth.max(depth);
            }
            '[' => {
                depth += 1;
                max_depth = max_depth.max(depth);
                arrays += 1;
            }
            '}' | ']' => depth = depth.saturating_sub(1),
            ':' => properties += 1,
            _ => {}
        }
    }
    (max_depth, arrays, properties)
}

/// Plan for splitting a bulk request across upstream calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingStrategy {
    /// Items the caller asked for (after capping).
    pub total_items: usize,
    /// Items requested per chunk; the last chunk absorbs the remainder.
    pub items_per_chunk: usize,
    /// Number of upstream calls.
    pub total_chunks: usize,
    /// Per-item output-token estimate the plan was built from.
    pub tokens_per_item: usize,
}

impl ChunkingStrategy {
    /// Item count for chunk `index` (0-based). All chunks are
    /// `items_per_chunk` except the last, which takes the remainder, so
    /// sizes always sum to exactly `total_items`.
    pub fn chunk_size(&self, index: usize) -> usize {
        if index + 1 == self.total_chunks {
            self.total_items - self.items_per_chunk * (self.total_chunks - 1)
        } else {
            self.items_per_chunk
        }
    }
}

/// Decides whether and how to decompose bulk requests.
pub struct ChunkPlanner {
    max_output_tokens: usize,
    auto_chunk: bool,
    max_item_count: usize,
    complexity: Cache<u64, ShapeComplexity>,
}

impl ChunkPlanner {
    /// Create a planner.
    ///
    /// `auto_chunk` globally enables decomposition; `max_item_count` caps
    /// what any single request may ask for.
    pub fn new(max_output_tokens: usize, auto_chunk: bool, max_item_count: usize) -> Self {
        Self {
            max_output_tokens,
            auto_chunk,
            max_item_count,
            complexity: Cache::new(COMPLEXITY_CACHE_MAX),
        }
    }

    /// Output tokens available for generated items in one upstream call.
    pub fn available_budget(&self) -> usize {
        (self.max_output_tokens as f64 * (1.0 - OVERHEAD_RATIO)) as usize
    }

    /// Estimated output tokens for one generated item of `shape`.
    pub fn estimate_tokens_per_item(&self, shape: Option<&str>) -> usize {
        let Some(shape) = shape else {
            return DEFAULT_TOKENS_PER_ITEM;
        };
        let complexity = self.complexity_of(shape);
        let raw = complexity.multiplier * shape.len() as f64 / CHARS_PER_TOKEN;
        raw.clamp(MIN_TOKENS_PER_ITEM, MAX_TOKENS_PER_ITEM) as usize
    }

    /// Complexity profile for `shape`, memoized per distinct shape.
    pub fn complexity_of(&self, shape: &str) -> ShapeComplexity {
        let key = super::shape_hash(shape);
        self.complexity
            .get_with(key, || ShapeComplexity::analyze(shape))
    }

    /// Cap a requested item count at the configured maximum.
    ///
    /// Capping is logged at warning level so an operator can see clients
    /// asking for more than the mock will produce.
    pub fn cap_requested(&self, requested: usize) -> usize {
        if requested > self.max_item_count {
            warn!(
                requested,
                cap = self.max_item_count,
                "requested item count exceeds maximum, capping"
            );
            self.max_item_count
        } else {
            requested
        }
    }

    /// Whether a bulk request must be decomposed.
    ///
    /// Never chunks when globally disabled, explicitly opted out, or for
    /// single-item requests.
    pub fn should_chunk(&self, shape: Option<&str>, requested: usize, opt_out: bool) -> bool {
        if !self.auto_chunk || opt_out || requested <= 1 {
            return false;
        }
        self.estimate_tokens_per_item(shape) * requested > self.available_budget()
    }

    /// Compute the chunk plan for a bulk request.
    ///
    /// First sizes chunks to fill the budget, then redistributes evenly so
    /// no chunk but the last is under-filled.
    pub fn plan(&self, shape: Option<&str>, requested: usize) -> ChunkingStrategy {
        let tokens_per_item = self.estimate_tokens_per_item(shape);
        let per_chunk = (self.available_budget() / tokens_per_item).max(1);
        let total_chunks = requested.div_ceil(per_chunk).max(1);
        let items_per_chunk = requested.div_ceil(total_chunks);
        ChunkingStrategy {
            total_items: requested,
            items_per_chunk,
            total_chunks,
            tokens_per_item,
        }
    }
}
