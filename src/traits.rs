//! Core CompletionSource trait

use async_trait::async_trait;

use crate::Result;

/// The upstream completion source the pipeline draws from.
///
/// Implementations wrap a real provider client (retries, circuit breaking,
/// protocol translation all live there) — the pipeline treats a single call
/// as atomic: it either returns content or raises.
#[async_trait]
pub trait CompletionSource: Send + Sync {
    /// Fetch a single completion for the given prompt.
    async fn fetch(&self, prompt: &str) -> Result<String>;

    /// Fetch `n` completions in one native upstream call.
    ///
    /// Providers without a native multi-completion form inherit this
    /// sequential fallback.
    async fn fetch_n(&self, prompt: &str, n: usize) -> Result<Vec<String>> {
        // Default: sequential fallback
        let mut results = Vec::with_capacity(n);
        for _ in 0..n {
            results.push(self.fetch(prompt).await?);
        }
        Ok(results)
    }
}
