// Chunking ingestor
// Embeds each document as one vector, falling back to chunked vectors
// when the embedding backend rejects the payload size. Best-effort: a
// failing document, chunk, or batch never aborts the run.

#[cfg(test)]
mod tests;

use indexmap::IndexMap;
use tracing::{info, warn};
use uuid::Uuid;

use crate::Result;
use crate::config::Config;
use crate::documents::Document;
use crate::embeddings::{EmbeddingTask, TextEmbedder, split_text};
use crate::store::{PointPayload, PointRecord, VectorStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    pub collection: String,
    pub vector_size: u32,
    pub max_chunk_size: usize,
    pub batch_size: usize,
}

impl IngestSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.qdrant.collection.clone(),
            vector_size: config.gemini.vector_size,
            max_chunk_size: config.ingestion.max_chunk_size,
            batch_size: config.ingestion.batch_size,
        }
    }
}

/// Summary of a single ingestion run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IngestReport {
    pub documents_embedded: usize,
    pub documents_chunked: usize,
    pub documents_skipped: usize,
    pub chunks_embedded: usize,
    pub points_written: usize,
    /// True when the collection already held vectors and the run was a no-op.
    pub skipped_existing: bool,
}

/// Writes documents into the vector store, chunking oversized ones.
pub struct Ingestor<'a, S, E> {
    store: &'a S,
    embedder: &'a E,
    settings: IngestSettings,
}

impl<'a, S: VectorStore, E: TextEmbedder> Ingestor<'a, S, E> {
    #[inline]
    pub fn new(store: &'a S, embedder: &'a E, settings: IngestSettings) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    /// Ingest a batch of documents.
    ///
    /// Idempotent: when the target collection already reports stored
    /// vectors, the run is a logged no-op rather than an error or a
    /// duplicate write.
    #[inline]
    pub fn ingest(&self, documents: &[Document]) -> Result<IngestReport> {
        let collection = &self.settings.collection;
        self.store
            .create_collection(collection, self.settings.vector_size)?;

        match self.store.collection_stats(collection) {
            Ok(stats) if stats.vector_count > 0 => {
                info!(
                    "Collection {} already holds {} vectors, skipping ingestion",
                    collection, stats.vector_count
                );
                return Ok(IngestReport {
                    skipped_existing: true,
                    ..IngestReport::default()
                });
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    "Failed to check stats for collection {}, proceeding with ingestion: {}",
                    collection, e
                );
            }
        }

        info!("Ingesting {} documents into {}", documents.len(), collection);

        let mut report = IngestReport::default();
        let mut pending: Vec<PointRecord> = Vec::new();

        for document in documents {
            if document.text.trim().is_empty() {
                warn!(
                    "Skipping document due to missing or invalid content: {}",
                    document.filename
                );
                report.documents_skipped += 1;
                continue;
            }

            self.process_document(document, &mut pending, &mut report);

            // Flush in batches so a transient store failure affects at
            // most one batch; failed batches stay in `pending` for the
            // final flush attempt.
            if pending.len() >= self.settings.batch_size {
                match self.store.upsert(collection, &pending) {
                    Ok(()) => {
                        report.points_written += pending.len();
                        pending.clear();
                    }
                    Err(e) => {
                        warn!(
                            "Batch write of {} points failed, retaining for final flush: {}",
                            pending.len(),
                            e
                        );
                    }
                }
            }
        }

        if !pending.is_empty() {
            match self.store.upsert(collection, &pending) {
                Ok(()) => report.points_written += pending.len(),
                Err(e) => {
                    warn!(
                        "Final batch write of {} points failed, those points were not persisted: {}",
                        pending.len(),
                        e
                    );
                }
            }
        }

        info!(
            "Ingestion finished: {} whole documents, {} chunked documents ({} chunks), {} skipped, {} points written",
            report.documents_embedded,
            report.documents_chunked,
            report.chunks_embedded,
            report.documents_skipped,
            report.points_written
        );

        Ok(report)
    }

    fn process_document(
        &self,
        document: &Document,
        pending: &mut Vec<PointRecord>,
        report: &mut IngestReport,
    ) {
        let metadata = payload_metadata(document);

        match self.embedder.embed(
            &document.text,
            EmbeddingTask::RetrievalDocument,
            Some(&document.filename),
        ) {
            Ok(vector) => {
                if !self.dimension_ok(&vector, &document.filename) {
                    report.documents_skipped += 1;
                    return;
                }

                pending.push(PointRecord {
                    id: Uuid::new_v4(),
                    vector,
                    payload: PointPayload::document(&document.filename, &document.text, metadata),
                });
                report.documents_embedded += 1;
            }
            Err(e) if e.is_payload_too_large() => {
                info!(
                    "Document exceeds the embedding size limit, applying chunking: {}",
                    document.filename
                );

                let chunk_points = self.embed_chunks(document, &metadata);
                if chunk_points.is_empty() {
                    warn!(
                        "All chunks failed to embed, skipping document: {}",
                        document.filename
                    );
                    report.documents_skipped += 1;
                } else {
                    report.documents_chunked += 1;
                    report.chunks_embedded += chunk_points.len();
                    pending.extend(chunk_points);
                }
            }
            Err(e) => {
                warn!("Error embedding document {}, skipping: {}", document.filename, e);
                report.documents_skipped += 1;
            }
        }
    }

    /// Embed each chunk of an oversized document independently. Per-chunk
    /// failures are logged and skipped; siblings are still attempted.
    fn embed_chunks(
        &self,
        document: &Document,
        metadata: &IndexMap<String, String>,
    ) -> Vec<PointRecord> {
        let chunks = split_text(&document.text, self.settings.max_chunk_size);
        let total = u32::try_from(chunks.len()).unwrap_or(u32::MAX);

        info!(
            "Document {} split into {} chunks",
            document.filename,
            chunks.len()
        );

        let mut points = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            let index = u32::try_from(i).unwrap_or(u32::MAX);
            let title = format!("{} [Part {}/{}]", document.filename, index + 1, total);

            match self
                .embedder
                .embed(chunk, EmbeddingTask::RetrievalDocument, Some(&title))
            {
                Ok(vector) => {
                    if !self.dimension_ok(&vector, &title) {
                        continue;
                    }

                    points.push(PointRecord {
                        id: Uuid::new_v4(),
                        vector,
                        payload: PointPayload::chunk(
                            &document.filename,
                            index,
                            total,
                            chunk,
                            metadata.clone(),
                        ),
                    });
                }
                Err(e) => {
                    warn!("Error embedding chunk {}, skipping: {}", title, e);
                }
            }
        }

        points
    }

    /// A vector of the wrong dimension would be stored and silently match
    /// poorly; the document is skipped with a warning instead.
    fn dimension_ok(&self, vector: &[f32], label: &str) -> bool {
        if vector.len() == self.settings.vector_size as usize {
            return true;
        }

        warn!(
            "Skipping {}: embedding has {} dimensions, expected {}",
            label,
            vector.len(),
            self.settings.vector_size
        );
        false
    }
}

/// Payload metadata: the document's source attributes plus its
/// last-updated date.
fn payload_metadata(document: &Document) -> IndexMap<String, String> {
    let mut metadata = document.metadata.clone();
    metadata.insert("last_updated".to_string(), document.last_updated.clone());
    metadata
}
