use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Serialize;
use tracing::warn;

use crate::util::{estimate_tokens, truncate_to_tokens};

/// Compiled-in default for the embeddings service; deployments override it
/// with `EMBEDDINGS_SERVICE_URL`.
pub const DEFAULT_EMBEDDINGS_URL: &str = "http://embeddings-service.internal:8080/embed";

/// Service-side context ceiling; batches estimated past this are split.
const TOKEN_WINDOW: usize = 8191;
/// Single large texts are cut to one chunk before submission; a news article
/// rarely carries useful signal past this.
const SINGLE_INPUT_MAX_TOKENS: usize = 4096;
const RETRY_ATTEMPTS: usize = 3;
const RETRY_DELAY: Duration = Duration::from_millis(10);

/// Task tag conditioning the embedding model's output space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingTask {
    SearchQuery,
    SearchDocument,
    Classification,
    Clustering,
}

impl EmbeddingTask {
    pub fn as_str(self) -> &'static str {
        match self {
            EmbeddingTask::SearchQuery => "search_query",
            EmbeddingTask::SearchDocument => "search_document",
            EmbeddingTask::Classification => "classification",
            EmbeddingTask::Clustering => "clustering",
        }
    }
}

impl std::fmt::Display for EmbeddingTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// --- TextEmbedder trait ---

#[async_trait::async_trait]
pub trait TextEmbedder: Send + Sync {
    /// One vector per input, order preserved. Failed inputs come back as
    /// empty vectors, never as a shorter list.
    async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Vec<Vec<f32>>;

    /// Single-text convenience over the batch path.
    async fn embed(&self, text: &str, task: EmbeddingTask) -> Vec<f32>;
}

#[derive(Serialize)]
struct InferenceInput<'a> {
    inputs: &'a [String],
}

/// Client for the remote embeddings service.
pub struct EmbeddingsClient {
    http: reqwest::Client,
    embed_url: String,
}

impl EmbeddingsClient {
    pub fn new(embed_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            embed_url: embed_url.into(),
        }
    }

    /// Submit a batch, splitting in half while the token estimate exceeds
    /// the service window. Halves are concatenated back in input order.
    async fn submit(&self, mut inputs: Vec<String>) -> Vec<Vec<f32>> {
        if inputs.is_empty() {
            return Vec::new();
        }
        let total: usize = inputs.iter().map(|t| estimate_tokens(t)).sum();
        if total > TOKEN_WINDOW && inputs.len() > 1 {
            let right = inputs.split_off(inputs.len() / 2);
            let mut out = Box::pin(self.submit(inputs)).await;
            out.extend(Box::pin(self.submit(right)).await);
            return out;
        }

        let expected = inputs.len();
        for attempt in 1..=RETRY_ATTEMPTS {
            match self.request(&inputs).await {
                Ok(vectors) => return vectors,
                Err(e) => {
                    warn!(attempt, error = %e, "Embedding generation failed");
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
        // Backstop: keep the output shape so positional callers stay
        // aligned; empty vectors read as "missing" downstream.
        vec![Vec::new(); expected]
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .http
            .post(&self.embed_url)
            .json(&InferenceInput { inputs })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow!("Embeddings service error ({status}): {error_text}"));
        }

        let vectors: Vec<Vec<f32>> = response.json().await?;
        if vectors.len() != inputs.len() {
            return Err(anyhow!(
                "Embeddings response length {} does not match input length {}",
                vectors.len(),
                inputs.len()
            ));
        }
        Ok(vectors)
    }
}

fn tag_input(text: &str, task: EmbeddingTask) -> String {
    format!("{}: {}", task.as_str(), text)
}

#[async_trait::async_trait]
impl TextEmbedder for EmbeddingsClient {
    async fn embed_batch(&self, texts: &[String], task: EmbeddingTask) -> Vec<Vec<f32>> {
        let inputs: Vec<String> = texts.iter().map(|t| tag_input(t, task)).collect();
        self.submit(inputs).await
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Vec<f32> {
        let input = tag_input(truncate_to_tokens(text, SINGLE_INPUT_MAX_TOKENS), task);
        self.submit(vec![input])
            .await
            .into_iter()
            .next()
            .unwrap_or_default()
    }
}
