//! Mimesis error types

/// Mimesis error types
#[derive(Debug, thiserror::Error)]
pub enum MimesisError {
    // Upstream errors
    #[error("upstream completion failed: {0}")]
    Upstream(String),

    #[error("empty response from completion source")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A chunk of a bulk generation produced output that is not valid JSON.
    ///
    /// Fatal for the whole chunked operation: downstream consumers expect a
    /// complete, valid collection, so there is no partial-data return.
    #[error("chunk {chunk} of {total} returned malformed JSON: {preview}")]
    MalformedChunk {
        chunk: usize,
        total: usize,
        preview: String,
    },

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No completion source was attached to the pipeline builder.
    #[error("no completion source configured")]
    NoSource,
}

/// Result type alias for Mimesis operations
pub type Result<T> = std::result::Result<T, MimesisError>;
