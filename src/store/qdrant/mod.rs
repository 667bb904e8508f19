
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::QdrantConfig;
use crate::store::{CollectionStats, PointPayload, PointRecord, ScoredPoint, StoreError, VectorStore};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Client for the Qdrant REST API.
#[derive(Debug, Clone)]
pub struct QdrantStore {
    base_url: Url,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
struct CreateCollectionRequest {
    vectors: VectorParams,
}

#[derive(Debug, Serialize)]
struct VectorParams {
    size: u32,
    distance: &'static str,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    points: &'a [PointRecord],
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct ListCollectionsResponse {
    result: CollectionList,
}

#[derive(Debug, Deserialize)]
struct CollectionList {
    collections: Vec<CollectionDescription>,
}

#[derive(Debug, Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Debug, Deserialize)]
struct CollectionInfoResponse {
    result: CollectionInfo,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    points_count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    result: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    score: f32,
    #[serde(default)]
    payload: Option<PointPayload>,
}

enum Method {
    Get,
    Put,
    Post,
}

impl QdrantStore {
    #[inline]
    pub fn new(config: &QdrantConfig) -> Result<Self> {
        let base_url = config
            .base_url()
            .context("Failed to parse Qdrant URL from config")?;

        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, StoreError> {
        self.base_url
            .join(path)
            .map_err(|e| StoreError::Transport(format!("failed to build URL for {path}: {e}")))
    }

    fn request_with_retry(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&str>,
    ) -> Result<String, StoreError> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!(
                "Store request attempt {}/{} for {}",
                attempt,
                self.retry_attempts,
                url.path()
            );

            let response = match method {
                Method::Get => self.agent.get(url.as_str()).call(),
                Method::Put => self
                    .agent
                    .put(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(body.unwrap_or_default()),
                Method::Post => self
                    .agent
                    .post(url.as_str())
                    .header("Content-Type", "application/json")
                    .send(body.unwrap_or_default()),
            };

            match response {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let body = response
                        .body_mut()
                        .read_to_string()
                        .map_err(|e| StoreError::Transport(e.to_string()))?;

                    if (200..300).contains(&status) {
                        return Ok(body);
                    }

                    if status >= 500 {
                        warn!(
                            "Store server error (status {}), attempt {}/{}",
                            status, attempt, self.retry_attempts
                        );
                        last_error = Some(StoreError::Api {
                            status,
                            message: truncated(&body),
                        });
                    } else {
                        return Err(StoreError::Api {
                            status,
                            message: truncated(&body),
                        });
                    }
                }
                Err(e) => {
                    warn!(
                        "Store transport error: {}, attempt {}/{}",
                        e, attempt, self.retry_attempts
                    );
                    last_error = Some(StoreError::Transport(e.to_string()));
                }
            }

            if attempt < self.retry_attempts {
                let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                std::thread::sleep(Duration::from_millis(delay_ms));
            }
        }

        error!("All retry attempts failed for store request to {}", url.path());
        Err(last_error
            .unwrap_or_else(|| StoreError::Transport("request failed after retries".to_string())))
    }
}

impl VectorStore for QdrantStore {
    #[inline]
    fn list_collections(&self) -> Result<Vec<String>, StoreError> {
        let url = self.endpoint("/collections")?;
        let body = self.request_with_retry(&Method::Get, &url, None)?;

        parse_collections_response(&body)
    }

    #[inline]
    fn create_collection(&self, name: &str, vector_size: u32) -> Result<(), StoreError> {
        if self.list_collections()?.iter().any(|c| c == name) {
            debug!("Collection {} already exists, skipping creation", name);
            return Ok(());
        }

        let request = CreateCollectionRequest {
            vectors: VectorParams {
                size: vector_size,
                distance: "Cosine",
            },
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| StoreError::Transport(format!("failed to serialize request: {e}")))?;

        let url = self.endpoint(&format!("/collections/{name}"))?;
        self.request_with_retry(&Method::Put, &url, Some(&request_json))?;

        info!("Created collection {} with vector size {}", name, vector_size);
        Ok(())
    }

    #[inline]
    fn collection_stats(&self, name: &str) -> Result<CollectionStats, StoreError> {
        let url = self.endpoint(&format!("/collections/{name}"))?;
        let body = self.request_with_retry(&Method::Get, &url, None)?;

        parse_stats_response(&body)
    }

    #[inline]
    fn upsert(&self, collection: &str, points: &[PointRecord]) -> Result<(), StoreError> {
        if points.is_empty() {
            return Ok(());
        }

        let request = UpsertRequest { points };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| StoreError::Transport(format!("failed to serialize points: {e}")))?;

        let url = self.endpoint(&format!("/collections/{collection}/points?wait=true"))?;
        self.request_with_retry(&Method::Put, &url, Some(&request_json))?;

        debug!("Upserted {} points into {}", points.len(), collection);
        Ok(())
    }

    #[inline]
    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>, StoreError> {
        let request = SearchRequest {
            vector,
            limit,
            with_payload: true,
        };
        let request_json = serde_json::to_string(&request)
            .map_err(|e| StoreError::Transport(format!("failed to serialize query: {e}")))?;

        let url = self.endpoint(&format!("/collections/{collection}/points/search"))?;
        let body = self.request_with_retry(&Method::Post, &url, Some(&request_json))?;

        parse_search_response(&body)
    }
}

fn parse_collections_response(body: &str) -> Result<Vec<String>, StoreError> {
    let response: ListCollectionsResponse =
        serde_json::from_str(body).map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

    Ok(response
        .result
        .collections
        .into_iter()
        .map(|c| c.name)
        .collect())
}

fn parse_stats_response(body: &str) -> Result<CollectionStats, StoreError> {
    let response: CollectionInfoResponse =
        serde_json::from_str(body).map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

    Ok(CollectionStats {
        vector_count: response.result.points_count,
    })
}

/// Normalize raw search hits; hits without a payload carry nothing usable
/// downstream and are dropped.
fn parse_search_response(body: &str) -> Result<Vec<ScoredPoint>, StoreError> {
    let response: SearchResponse =
        serde_json::from_str(body).map_err(|e| StoreError::InvalidResponse(e.to_string()))?;

    Ok(response
        .result
        .into_iter()
        .filter_map(|hit| {
            hit.payload.map(|payload| ScoredPoint {
                score: hit.score,
                payload,
            })
        })
        .collect())
}

fn truncated(body: &str) -> String {
    body.chars().take(200).collect()
}
