use super::*;
use std::cell::RefCell;
use std::result::Result;

use crate::embeddings::EmbeddingError;
use crate::store::{CollectionStats, ScoredPoint, StoreError};

#[derive(Default)]
struct FakeStore {
    collections: RefCell<Vec<String>>,
    existing_vectors: u64,
    stats_fail: bool,
    failing_upserts: RefCell<usize>,
    upserts: RefCell<Vec<Vec<PointRecord>>>,
}

impl FakeStore {
    fn stored_points(&self) -> Vec<PointRecord> {
        self.upserts.borrow().iter().flatten().cloned().collect()
    }
}

impl VectorStore for FakeStore {
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.collections.borrow().clone())
    }

    fn create_collection(&self, name: &str, _vector_size: u32) -> Result<(), StoreError> {
        let mut collections = self.collections.borrow_mut();
        if !collections.iter().any(|c| c == name) {
            collections.push(name.to_string());
        }
        Ok(())
    }

    fn collection_stats(&self, _name: &str) -> Result<CollectionStats, StoreError> {
        if self.stats_fail {
            return Err(StoreError::Transport("stats unavailable".to_string()));
        }
        Ok(CollectionStats {
            vector_count: self.existing_vectors,
        })
    }

    fn upsert(&self, _collection: &str, points: &[PointRecord]) -> Result<(), StoreError> {
        let mut failing = self.failing_upserts.borrow_mut();
        if *failing > 0 {
            *failing -= 1;
            return Err(StoreError::Api {
                status: 503,
                message: "temporarily unavailable".to_string(),
            });
        }
        self.upserts.borrow_mut().push(points.to_vec());
        Ok(())
    }

    fn query(
        &self,
        _collection: &str,
        _vector: &[f32],
        _limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        Ok(Vec::new())
    }
}

struct FakeEmbedder {
    dimension: usize,
    /// Inputs longer than this report the backend's size limit.
    size_limit: usize,
    /// Inputs containing this marker fail with a generic API error.
    poison: Option<&'static str>,
    tasks_seen: RefCell<Vec<EmbeddingTask>>,
}

impl FakeEmbedder {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            size_limit: usize::MAX,
            poison: None,
            tasks_seen: RefCell::new(Vec::new()),
        }
    }

    fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = limit;
        self
    }

    fn with_poison(mut self, marker: &'static str) -> Self {
        self.poison = Some(marker);
        self
    }
}

impl TextEmbedder for FakeEmbedder {
    fn embed(
        &self,
        text: &str,
        task: EmbeddingTask,
        _title: Option<&str>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        self.tasks_seen.borrow_mut().push(task);

        // Size is rejected before content, as a real backend would
        if text.len() > self.size_limit {
            return Err(EmbeddingError::PayloadTooLarge { size: text.len() });
        }

        if let Some(marker) = self.poison {
            if text.contains(marker) {
                return Err(EmbeddingError::Api {
                    status: 400,
                    message: "invalid input".to_string(),
                });
            }
        }

        Ok(vec![0.5; self.dimension])
    }
}

fn settings() -> IngestSettings {
    IngestSettings {
        collection: "test-docs".to_string(),
        vector_size: 4,
        max_chunk_size: 600,
        batch_size: 50,
    }
}

fn doc(filename: &str, text: impl Into<String>) -> Document {
    let mut document = Document::new(filename, text);
    document
        .metadata
        .insert("Source".to_string(), "https://example.edu".to_string());
    document
}

#[test]
fn small_documents_stored_whole() {
    let store = FakeStore::default();
    let embedder = FakeEmbedder::new(4);
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let report = ingestor
        .ingest(&[doc("A", "first document"), doc("B", "second document")])
        .expect("ingest should succeed");

    assert_eq!(report.documents_embedded, 2);
    assert_eq!(report.documents_chunked, 0);
    assert_eq!(report.points_written, 2);
    assert!(!report.skipped_existing);

    let points = store.stored_points();
    assert_eq!(points.len(), 2);
    assert!(points.iter().all(|p| !p.payload.is_chunk));
    assert_eq!(points[0].payload.filename, "A");
    assert_eq!(points[0].payload.metadata["Source"], "https://example.edu");
    assert!(points[0].payload.metadata.contains_key("last_updated"));
    assert!(embedder
        .tasks_seen
        .borrow()
        .iter()
        .all(|t| *t == EmbeddingTask::RetrievalDocument));
}

#[test]
fn oversized_document_falls_back_to_chunks() {
    let store = FakeStore::default();
    let embedder = FakeEmbedder::new(4).with_size_limit(1000);
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let paragraphs: Vec<String> = (0..8)
        .map(|i| format!("Paragraph {i}. {}", "university facts ".repeat(20)))
        .collect();
    let report = ingestor
        .ingest(&[doc("Berkeley", paragraphs.join("\n\n"))])
        .expect("ingest should succeed");

    assert_eq!(report.documents_embedded, 0);
    assert_eq!(report.documents_chunked, 1);
    assert!(report.chunks_embedded >= 2);

    let points = store.stored_points();
    assert_eq!(points.len(), report.chunks_embedded);
    let total = u32::try_from(points.len()).expect("chunk count fits u32");
    for (i, point) in points.iter().enumerate() {
        let index = u32::try_from(i).expect("index fits u32");
        assert!(point.payload.is_chunk);
        assert_eq!(point.payload.parent_document.as_deref(), Some("Berkeley"));
        assert_eq!(point.payload.chunk_index, Some(index));
        assert_eq!(point.payload.total_chunks, Some(total));
        assert_eq!(
            point.payload.filename,
            format!("Berkeley [Part {}/{}]", index + 1, total)
        );
        assert!(point.payload.text.len() <= 600);
    }
}

#[test]
fn populated_collection_makes_ingest_a_noop() {
    let store = FakeStore {
        existing_vectors: 42,
        ..FakeStore::default()
    };
    let embedder = FakeEmbedder::new(4);
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let report = ingestor
        .ingest(&[doc("A", "text")])
        .expect("ingest should succeed");

    assert!(report.skipped_existing);
    assert_eq!(report.points_written, 0);
    assert!(store.upserts.borrow().is_empty());
    assert!(embedder.tasks_seen.borrow().is_empty());
}

#[test]
fn stats_failure_does_not_block_ingestion() {
    let store = FakeStore {
        stats_fail: true,
        ..FakeStore::default()
    };
    let embedder = FakeEmbedder::new(4);
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let report = ingestor
        .ingest(&[doc("A", "text")])
        .expect("ingest should succeed");

    assert_eq!(report.points_written, 1);
}

#[test]
fn embedding_failure_skips_only_that_document() {
    let store = FakeStore::default();
    let embedder = FakeEmbedder::new(4).with_poison("broken");
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let report = ingestor
        .ingest(&[doc("Bad", "broken content"), doc("Good", "fine content")])
        .expect("ingest should succeed");

    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.documents_embedded, 1);

    let points = store.stored_points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].payload.filename, "Good");
}

#[test]
fn failed_chunk_skipped_but_siblings_stored() {
    let store = FakeStore::default();
    let embedder = FakeEmbedder::new(4).with_size_limit(1000).with_poison("poison");
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let good = format!("Good paragraph. {}", "more text ".repeat(40));
    let bad = format!("poison paragraph. {}", "more text ".repeat(40));
    let text = [good.as_str(), bad.as_str(), good.as_str()].join("\n\n");

    let report = ingestor
        .ingest(&[doc("Mixed", text)])
        .expect("ingest should succeed");

    assert_eq!(report.documents_chunked, 1);
    let points = store.stored_points();
    assert!(!points.is_empty());
    assert!(points.iter().all(|p| !p.payload.text.contains("poison")));
}

#[test]
fn failed_batch_is_retained_for_final_flush() {
    let store = FakeStore {
        failing_upserts: RefCell::new(1),
        ..FakeStore::default()
    };
    let embedder = FakeEmbedder::new(4);
    let mut ingest_settings = settings();
    ingest_settings.batch_size = 2;
    let ingestor = Ingestor::new(&store, &embedder, ingest_settings);

    let documents: Vec<Document> = ["A", "B", "C"]
        .iter()
        .map(|name| doc(name, format!("{name} content")))
        .collect();
    let report = ingestor
        .ingest(&documents)
        .expect("ingest should succeed");

    // The first flush of 2 fails and is retained; all 3 points land in a
    // later successful write
    assert_eq!(report.points_written, 3);
    assert_eq!(store.stored_points().len(), 3);
}

#[test]
fn blank_documents_are_skipped() {
    let store = FakeStore::default();
    let embedder = FakeEmbedder::new(4);
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let report = ingestor
        .ingest(&[doc("Empty", "   "), doc("Good", "content")])
        .expect("ingest should succeed");

    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.documents_embedded, 1);
}

#[test]
fn wrong_dimension_embedding_skips_document() {
    let store = FakeStore::default();
    let embedder = FakeEmbedder::new(8);
    let ingestor = Ingestor::new(&store, &embedder, settings());

    let report = ingestor
        .ingest(&[doc("A", "text")])
        .expect("ingest should succeed");

    assert_eq!(report.documents_skipped, 1);
    assert!(store.stored_points().is_empty());
}
