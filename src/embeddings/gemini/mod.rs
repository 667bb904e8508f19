#[cfg(test)]
mod tests;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::GeminiConfig;
use crate::embeddings::{EmbeddingError, EmbeddingTask, TextEmbedder};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u64 = 2;

/// Marker the backend includes in the HTTP 400 body when the request
/// exceeds its payload size limit; this is what triggers the chunking
/// fallback during ingestion.
const SIZE_LIMIT_MARKER: &str = "payload size exceeds the limit";

/// Client for the Gemini `embedContent` REST API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: Url,
    api_key: String,
    model: String,
    agent: ureq::Agent,
    retry_attempts: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedContentResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl GeminiClient {
    #[inline]
    pub fn new(config: &GeminiConfig, api_key: impl Into<String>) -> Result<Self> {
        let base_url = Url::parse(DEFAULT_BASE_URL).context("Failed to parse Gemini base URL")?;

        // Status errors are handled manually so error bodies stay readable;
        // the size-limit condition lives in a 400 response body.
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)))
            .http_status_as_error(false)
            .build()
            .into();

        Ok(Self {
            base_url,
            api_key: api_key.into(),
            model: config.model.clone(),
            agent,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
        })
    }

    /// Point the client at a different API host (proxy or test server).
    #[inline]
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts;
        self
    }

    fn embed_url(&self) -> Result<Url, EmbeddingError> {
        let mut url = self
            .base_url
            .join(&format!("/v1beta/{}:embedContent", self.model))
            .map_err(|e| EmbeddingError::Transport(format!("failed to build embed URL: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }

    fn post_with_retry(
        &self,
        url: &Url,
        request_json: &str,
        payload_size: usize,
    ) -> Result<String, EmbeddingError> {
        let mut last_error = None;

        for attempt in 1..=self.retry_attempts {
            debug!("Embedding request attempt {}/{}", attempt, self.retry_attempts);

            match self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(request_json)
            {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let body = response
                        .body_mut()
                        .read_to_string()
                        .map_err(|e| EmbeddingError::Transport(e.to_string()))?;

                    if (200..300).contains(&status) {
                        return Ok(body);
                    }

                    if status >= 500 {
                        warn!(
                            "Embedding backend server error (status {}), attempt {}/{}",
                            status, attempt, self.retry_attempts
                        );
                        last_error = Some(EmbeddingError::Api {
                            status,
                            message: api_error_message(&body),
                        });
                    } else {
                        return Err(classify_client_error(status, &body, payload_size));
                    }
                }
                Err(e) => {
                    warn!(
                        "Embedding transport error: {}, attempt {}/{}",
                        e, attempt, self.retry_attempts
                    );
                    last_error = Some(EmbeddingError::Transport(e.to_string()));
                }
            }

            if attempt < self.retry_attempts {
                let delay_ms = EXPONENTIAL_BACKOFF_BASE.pow(attempt - 1) * 1000;
                std::thread::sleep(Duration::from_millis(delay_ms));
            }
        }

        error!("All retry attempts failed for embedding request");
        Err(last_error
            .unwrap_or_else(|| EmbeddingError::Transport("request failed after retries".to_string())))
    }
}

impl TextEmbedder for GeminiClient {
    #[inline]
    fn embed(
        &self,
        text: &str,
        task: EmbeddingTask,
        title: Option<&str>,
    ) -> Result<Vec<f32>, EmbeddingError> {
        debug!(
            "Generating embedding for {} bytes of text (task {:?})",
            text.len(),
            task
        );

        let request = EmbedContentRequest {
            model: &self.model,
            content: Content {
                parts: vec![Part { text }],
            },
            task_type: task_type_name(task),
            title,
        };

        let request_json = serde_json::to_string(&request)
            .map_err(|e| EmbeddingError::Transport(format!("failed to serialize request: {e}")))?;

        let url = self.embed_url()?;
        let body = self.post_with_retry(&url, &request_json, text.len())?;

        let response: EmbedContentResponse = serde_json::from_str(&body)
            .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

        if response.embedding.values.is_empty() {
            return Err(EmbeddingError::InvalidResponse(
                "backend returned an empty embedding".to_string(),
            ));
        }

        debug!(
            "Generated embedding with {} dimensions",
            response.embedding.values.len()
        );

        Ok(response.embedding.values)
    }
}

fn task_type_name(task: EmbeddingTask) -> &'static str {
    match task {
        EmbeddingTask::RetrievalDocument => "RETRIEVAL_DOCUMENT",
        EmbeddingTask::RetrievalQuery => "RETRIEVAL_QUERY",
    }
}

fn classify_client_error(status: u16, body: &str, payload_size: usize) -> EmbeddingError {
    if status == 400 && body.contains(SIZE_LIMIT_MARKER) {
        return EmbeddingError::PayloadTooLarge { size: payload_size };
    }

    EmbeddingError::Api {
        status,
        message: api_error_message(body),
    }
}

/// Pull the human-readable message out of a backend error body, falling
/// back to the raw body when it is not the documented error shape.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|response| response.error.message)
        .unwrap_or_else(|_| body.chars().take(200).collect())
}
