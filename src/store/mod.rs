// Vector store boundary
// Hits are normalized into typed records here so the merge logic never
// handles raw JSON shapes

pub mod qdrant;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub use qdrant::QdrantStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("vector store API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("vector store transport error: {0}")]
    Transport(String),

    #[error("malformed vector store response: {0}")]
    InvalidResponse(String),
}

/// Flattened metadata stored alongside each vector.
///
/// Whole documents carry only `filename`, `text`, and `metadata`; chunk
/// records additionally carry the parent linkage fields. These linkage
/// fields are internal bookkeeping and never reach callers of the
/// retriever.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointPayload {
    pub filename: String,
    pub text: String,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_chunk: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_document: Option<String>,
}

impl PointPayload {
    /// Payload for a document embedded as one unit.
    #[inline]
    pub fn document(
        filename: impl Into<String>,
        text: impl Into<String>,
        metadata: IndexMap<String, String>,
    ) -> Self {
        Self {
            filename: filename.into(),
            text: text.into(),
            metadata,
            is_chunk: false,
            chunk_index: None,
            total_chunks: None,
            parent_document: None,
        }
    }

    /// Payload for one chunk of an oversized document. `chunk_index` is
    /// 0-based and contiguous across the document's `total_chunks` siblings.
    #[inline]
    pub fn chunk(
        parent_document: impl Into<String>,
        chunk_index: u32,
        total_chunks: u32,
        text: impl Into<String>,
        metadata: IndexMap<String, String>,
    ) -> Self {
        let parent = parent_document.into();
        Self {
            filename: format!("{parent} [Part {}/{}]", chunk_index + 1, total_chunks),
            text: text.into(),
            metadata,
            is_chunk: true,
            chunk_index: Some(chunk_index),
            total_chunks: Some(total_chunks),
            parent_document: Some(parent),
        }
    }
}

/// The unit written to the vector backend: one embedding plus its payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: PointPayload,
}

/// A raw nearest-neighbor hit; higher score means more relevant.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPoint {
    pub score: f32,
    pub payload: PointPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionStats {
    pub vector_count: u64,
}

/// A storage backend for vectors with similarity search.
///
/// Production uses [`QdrantStore`]; tests inject in-memory fakes.
pub trait VectorStore {
    fn list_collections(&self) -> Result<Vec<String>, StoreError>;

    /// Create a named collection. No-op if it already exists.
    fn create_collection(&self, name: &str, vector_size: u32) -> Result<(), StoreError>;

    fn collection_stats(&self, name: &str) -> Result<CollectionStats, StoreError>;

    fn upsert(&self, collection: &str, points: &[PointRecord]) -> Result<(), StoreError>;

    /// Nearest-neighbor search returning up to `limit` hits ordered by
    /// descending score, payloads included.
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError>;
}
