// Merge-aware retriever
// Searches chunks and whole documents together, recombines sibling chunks
// into one result per parent document, and returns a ranked,
// metadata-clean list


use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use itertools::Itertools;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::{EmbeddingTask, TextEmbedder};
use crate::store::{PointPayload, ScoredPoint, VectorStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalSettings {
    pub collection: String,
    /// Multiplier applied to top_k for the raw store query; several raw
    /// hits may collapse into a single merged result, and chunks can
    /// crowd whole documents out of an exact top_k fetch.
    pub overfetch_factor: usize,
    pub max_chunks_per_merge: usize,
}

impl RetrievalSettings {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            collection: config.qdrant.collection.clone(),
            overfetch_factor: config.retrieval.overfetch_factor,
            max_chunks_per_merge: config.retrieval.max_chunks_per_merge,
        }
    }
}

/// A finalized retrieval result: merged, ranked, and stripped of internal
/// bookkeeping. `metadata` holds the citation filename, the document's
/// source attributes, and a human-readable `note` for merged entries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultEntry {
    pub text: String,
    pub score: f32,
    pub metadata: IndexMap<String, String>,
}

/// An accepted candidate between partitioning and ranking: either a whole
/// document hit or a group of sibling chunks merged into one.
struct Candidate {
    score: f32,
    payload: PointPayload,
    /// Number of chunks recombined into this candidate, when merged.
    combined_from: Option<usize>,
}

pub struct Retriever<'a, S, E> {
    store: &'a S,
    embedder: &'a E,
    settings: RetrievalSettings,
}

impl<'a, S: VectorStore, E: TextEmbedder> Retriever<'a, S, E> {
    #[inline]
    pub fn new(store: &'a S, embedder: &'a E, settings: RetrievalSettings) -> Self {
        Self {
            store,
            embedder,
            settings,
        }
    }

    /// Retrieve up to `top_k` results for `query`, ranked by descending
    /// score.
    ///
    /// Retrieval is advisory: embedding or store failures are logged and
    /// yield an empty list rather than an error, so a degraded backend
    /// never takes the caller down with it.
    #[inline]
    pub fn semantic_search(&self, query: &str, top_k: usize) -> Vec<ResultEntry> {
        match self.search(query, top_k) {
            Ok(entries) => {
                info!(
                    "Semantic search completed: {} results for {} requested",
                    entries.len(),
                    top_k
                );
                entries
            }
            Err(e) => {
                warn!(
                    "Semantic search failed for query \"{}\": {}",
                    truncated_query(query),
                    e
                );
                Vec::new()
            }
        }
    }

    fn search(&self, query: &str, top_k: usize) -> crate::Result<Vec<ResultEntry>> {
        let mut vector = self
            .embedder
            .embed(query, EmbeddingTask::RetrievalQuery, None)?;

        // The store is a different call boundary than the embedder and
        // rejects non-finite numbers outright
        let replaced = sanitize_vector(&mut vector);
        if replaced > 0 {
            warn!(
                "Replaced {} non-finite values in the query embedding with 0.0",
                replaced
            );
        }

        let limit = top_k * self.settings.overfetch_factor;
        let hits = self
            .store
            .query(&self.settings.collection, &vector, limit)?;
        debug!("Store returned {} raw hits", hits.len());

        let candidates = merge_candidates(hits, self.settings.max_chunks_per_merge);

        Ok(candidates
            .into_iter()
            .sorted_by(|a, b| b.score.total_cmp(&a.score))
            .take(top_k)
            .map(Candidate::into_result_entry)
            .collect())
    }
}

/// Partition raw hits into whole-document candidates and per-parent chunk
/// groups, then merge each surviving group into a single candidate.
///
/// A whole-document hit always takes precedence over chunks of the same
/// document, regardless of encounter order, so callers never see a
/// document alongside its own fragments. Duplicate whole-document hits
/// are first-seen-wins.
fn merge_candidates(hits: Vec<ScoredPoint>, max_chunks_per_merge: usize) -> Vec<Candidate> {
    let mut seen_documents: HashSet<String> = HashSet::new();
    let mut candidates: Vec<Candidate> = Vec::new();
    let mut group_order: Vec<String> = Vec::new();
    let mut chunk_groups: HashMap<String, Vec<ScoredPoint>> = HashMap::new();

    for hit in hits {
        if hit.payload.is_chunk {
            let Some(parent) = hit.payload.parent_document.clone() else {
                warn!(
                    "Dropping chunk hit without parent linkage: {}",
                    hit.payload.filename
                );
                continue;
            };

            let group = chunk_groups.entry(parent.clone()).or_default();
            if group.is_empty() {
                group_order.push(parent);
            }
            group.push(hit);
        } else if seen_documents.insert(hit.payload.filename.clone()) {
            candidates.push(Candidate {
                score: hit.score,
                payload: hit.payload,
                combined_from: None,
            });
        }
    }

    for parent in group_order {
        if !seen_documents.insert(parent.clone()) {
            // The whole document was also retrieved; its fragments are
            // redundant
            continue;
        }

        let Some(group) = chunk_groups.remove(&parent) else {
            continue;
        };

        if let Some(candidate) = merge_chunk_group(parent, group, max_chunks_per_merge) {
            candidates.push(candidate);
        }
    }

    candidates
}

/// Recombine sibling chunks into one candidate.
///
/// Membership is the first `max_chunks` in chunk-index order: the
/// document's earliest chunks are kept regardless of their individual
/// scores. The merged score is the maximum among the retained chunks, so
/// the best-matching fragment ranks the whole. Text is joined blank-line
/// separated in index order.
fn merge_chunk_group(
    parent: String,
    mut group: Vec<ScoredPoint>,
    max_chunks: usize,
) -> Option<Candidate> {
    group.sort_by_key(|hit| hit.payload.chunk_index.unwrap_or(0));
    group.truncate(max_chunks);

    let score = group
        .iter()
        .map(|hit| hit.score)
        .fold(f32::NEG_INFINITY, f32::max);
    let text = group
        .iter()
        .map(|hit| hit.payload.text.as_str())
        .join("\n\n");
    let count = group.len();

    let mut payload = group.into_iter().next()?.payload;
    payload.text = text;
    payload.filename = parent;

    Some(Candidate {
        score,
        payload,
        combined_from: Some(count),
    })
}

impl Candidate {
    /// Build the caller-facing entry: the citation filename, the
    /// document's source attributes, and the merge note when applicable.
    /// Chunk linkage fields never transfer; the typed conversion cannot
    /// produce them.
    fn into_result_entry(self) -> ResultEntry {
        let PointPayload {
            filename,
            text,
            metadata: attributes,
            ..
        } = self.payload;

        let mut metadata = IndexMap::with_capacity(attributes.len() + 2);
        metadata.insert("filename".to_string(), filename);
        metadata.extend(attributes);

        if let Some(count) = self.combined_from {
            metadata.insert(
                "note".to_string(),
                format!("Document combined from {count} parts"),
            );
        }

        ResultEntry {
            text,
            score: sanitize_score(self.score),
            metadata,
        }
    }
}

/// Replace non-finite vector elements with 0.0, returning how many were
/// replaced.
fn sanitize_vector(vector: &mut [f32]) -> usize {
    let mut replaced = 0;
    for value in vector.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
            replaced += 1;
        }
    }
    replaced
}

fn sanitize_score(score: f32) -> f32 {
    if score.is_finite() { score } else { 0.0 }
}

fn truncated_query(query: &str) -> String {
    query.chars().take(80).collect()
}
