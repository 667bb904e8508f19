// Embeddings module
// Text embedding seam plus the chunk splitter used when a document
// exceeds the backend's payload limit

pub mod chunking;
pub mod gemini;

use thiserror::Error;

pub use chunking::{DEFAULT_MAX_CHUNK_SIZE, split_text};
pub use gemini::GeminiClient;

/// Embedding mode; the backend optimizes document and query vectors
/// differently, so ingestion and retrieval must not share a mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    RetrievalDocument,
    RetrievalQuery,
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The input exceeds the backend's request size limit. Distinguished
    /// from other failures so ingestion can fall back to chunking.
    #[error("embedding payload of {size} bytes exceeds the backend limit")]
    PayloadTooLarge { size: usize },

    #[error("embedding API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("embedding transport error: {0}")]
    Transport(String),

    #[error("malformed embedding response: {0}")]
    InvalidResponse(String),
}

impl EmbeddingError {
    #[inline]
    pub fn is_payload_too_large(&self) -> bool {
        matches!(self, Self::PayloadTooLarge { .. })
    }
}

/// A text embedding backend.
///
/// Production uses [`GeminiClient`]; tests inject in-memory fakes.
pub trait TextEmbedder {
    /// Embed `text` into a fixed-length vector. `title` tags the input for
    /// backends that use it as retrieval context (document mode only).
    fn embed(
        &self,
        text: &str,
        task: EmbeddingTask,
        title: Option<&str>,
    ) -> Result<Vec<f32>, EmbeddingError>;
}
