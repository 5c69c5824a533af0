//! Pipeline configuration surface.
//!
//! Loading and wiring happen elsewhere (TOML, env, whatever the host
//! server uses); the pipeline only reads these values. All fields have
//! defaults so a partial table deserializes cleanly.

use serde::Deserialize;

/// Read-only configuration consumed by the delivery pipeline.
///
/// ```rust
/// # use mimesis::PipelineConfig;
/// let config = PipelineConfig::new()
///     .max_cache_keys(500)
///     .max_output_tokens(4096)
///     .default_delay("500-1500");
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of distinct cache keys before eviction kicks in.
    /// Default: 1,000.
    #[serde(default = "default_max_cache_keys")]
    pub max_cache_keys: usize,
    /// Maximum completions primed/refilled per cache key. Default: 10.
    #[serde(default = "default_max_items_per_key")]
    pub max_items_per_key: usize,
    /// Default delay specification applied when a request carries no
    /// override. `None` disables simulated delays.
    #[serde(default)]
    pub default_delay: Option<String>,
    /// Output-token budget of the upstream model. Default: 4,096.
    #[serde(default = "default_max_output_tokens")]
    pub max_output_tokens: usize,
    /// Whether bulk requests may be decomposed into chunks. Default: true.
    #[serde(default = "default_auto_chunk")]
    pub auto_chunk: bool,
    /// Hard cap on the requested item count, regardless of what the client
    /// asked for. Default: 250.
    #[serde(default = "default_max_item_count")]
    pub max_item_count: usize,
    /// Sliding-window size for per-endpoint latency statistics. Default: 20.
    #[serde(default = "default_stats_window")]
    pub stats_window: usize,
}

fn default_max_cache_keys() -> usize {
    1_000
}

fn default_max_items_per_key() -> usize {
    10
}

fn default_max_output_tokens() -> usize {
    4_096
}

fn default_auto_chunk() -> bool {
    true
}

fn default_max_item_count() -> usize {
    250
}

fn default_stats_window() -> usize {
    20
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_cache_keys: default_max_cache_keys(),
            max_items_per_key: default_max_items_per_key(),
            default_delay: None,
            max_output_tokens: default_max_output_tokens(),
            auto_chunk: default_auto_chunk(),
            max_item_count: default_max_item_count(),
            stats_window: default_stats_window(),
        }
    }
}

impl PipelineConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of distinct cache keys.
    pub fn max_cache_keys(mut self, n: usize) -> Self {
        self.max_cache_keys = n;
        self
    }

    /// Set the maximum completions cached per key.
    pub fn max_items_per_key(mut self, n: usize) -> Self {
        self.max_items_per_key = n;
        self
    }

    /// Set the default delay specification (see [`DelaySpec`](crate::DelaySpec)).
    pub fn default_delay(mut self, spec: impl Into<String>) -> Self {
        self.default_delay = Some(spec.into());
        self
    }

    /// Set the upstream output-token budget.
    pub fn max_output_tokens(mut self, n: usize) -> Self {
        self.max_output_tokens = n;
        self
    }

    /// Enable or disable automatic chunking of bulk requests.
    pub fn auto_chunk(mut self, enabled: bool) -> Self {
        self.auto_chunk = enabled;
        self
    }

    /// Set the hard cap on requested item counts.
    pub fn max_item_count(mut self, n: usize) -> Self {
        self.max_item_count = n;
        self
    }

    /// Set the latency statistics window size.
    pub fn stats_window(mut self, n: usize) -> Self {
        self.stats_window = n;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_cache_keys, 1_000);
        assert_eq!(config.max_items_per_key, 10);
        assert!(config.default_delay.is_none());
        assert!(config.auto_chunk);
    }

    #[test]
    fn builder_pattern() {
        let config = PipelineConfig::new()
            .max_cache_keys(100)
            .default_delay("avg")
            .auto_chunk(false);
        assert_eq!(config.max_cache_keys, 100);
        assert_eq!(config.default_delay.as_deref(), Some("avg"));
        assert!(!config.auto_chunk);
    }

    #[test]
    fn partial_table_deserializes_with_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"max_output_tokens": 2000}"#).unwrap();
        assert_eq!(config.max_output_tokens, 2000);
        assert_eq!(config.stats_window, 20);
    }
}
